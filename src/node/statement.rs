//! Typed engine mutations.
//!
//! The orchestrator never builds SQL text by hand. Every write it can issue
//! is one of these variants, and a session renders it with [`Statement::to_tsql`].
//! Keeping them typed lets tests assert on intent (and lets a read-only path
//! prove it issued none).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::{EncryptionAlgorithm, EndpointRole};

/// One DDL statement issued against a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// Create the database mirroring endpoint, initially stopped.
    CreateEndpoint {
        name: String,
        port: u16,
        role: EndpointRole,
        encryption: EncryptionAlgorithm,
    },

    StopEndpoint { name: String },

    StartEndpoint { name: String },

    /// Allow `login` to connect to the endpoint.
    GrantConnect { endpoint: String, login: String },

    DropDatabase { database: String },

    /// Point `database` at its partner's endpoint URL.
    SetPartner { database: String, partner_url: String },

    /// Point `database` at the witness endpoint URL.
    SetWitness { database: String, witness_url: String },
}

impl Statement {
    /// Short name of the statement kind, stable for logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateEndpoint { .. } => "create_endpoint",
            Statement::StopEndpoint { .. } => "stop_endpoint",
            Statement::StartEndpoint { .. } => "start_endpoint",
            Statement::GrantConnect { .. } => "grant_connect",
            Statement::DropDatabase { .. } => "drop_database",
            Statement::SetPartner { .. } => "set_partner",
            Statement::SetWitness { .. } => "set_witness",
        }
    }

    /// Render as T-SQL.
    pub fn to_tsql(&self) -> String {
        match self {
            Statement::CreateEndpoint {
                name,
                port,
                role,
                encryption,
            } => format!(
                "CREATE ENDPOINT {} STATE = STOPPED AS TCP (LISTENER_PORT = {}) \
                 FOR DATABASE_MIRRORING (ROLE = {}, ENCRYPTION = REQUIRED ALGORITHM {})",
                quote_ident(name),
                port,
                role.as_tsql(),
                encryption.as_tsql()
            ),
            Statement::StopEndpoint { name } => {
                format!("ALTER ENDPOINT {} STATE = STOPPED", quote_ident(name))
            }
            Statement::StartEndpoint { name } => {
                format!("ALTER ENDPOINT {} STATE = STARTED", quote_ident(name))
            }
            Statement::GrantConnect { endpoint, login } => format!(
                "GRANT CONNECT ON ENDPOINT::{} TO {}",
                quote_ident(endpoint),
                quote_ident(login)
            ),
            Statement::DropDatabase { database } => {
                format!("DROP DATABASE {}", quote_ident(database))
            }
            Statement::SetPartner {
                database,
                partner_url,
            } => format!(
                "ALTER DATABASE {} SET PARTNER = {}",
                quote_ident(database),
                quote_literal(partner_url)
            ),
            Statement::SetWitness {
                database,
                witness_url,
            } => format!(
                "ALTER DATABASE {} SET WITNESS = {}",
                quote_ident(database),
                quote_literal(witness_url)
            ),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tsql())
    }
}

/// Bracket-quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a Unicode string literal.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}
