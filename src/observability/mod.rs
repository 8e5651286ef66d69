//! Observability
//!
//! Structured JSON logging with typed event names. Observability is
//! read-only: it describes what a run did and never feeds back into it.
//!
//! ```ignore
//! use mirrorctl::observability::{log_event, Event};
//!
//! log_event(Event::RunStart, &[("database", "orders")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event with fields at the severity its kind implies.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // verifies no panic
        log_event(Event::RunStart, &[]);
        log_event(Event::WitnessDegraded, &[("node", "sql-w")]);
    }
}
