//! Resolution of the identity a node authenticates as on its partners.
//!
//! A domain or local service account is granted as-is. Built-in accounts
//! (LocalSystem, Network Service, per-service virtual accounts, and the
//! `mssql` account SQL Server runs under on Linux) present the machine
//! account `DOMAIN\HOST$` on the network, so that is what partners must grant.

use crate::node::{HostPlatform, ServerInfo};

const MACHINE_ACCOUNT_ALIASES: &[&str] = &[
    "localsystem",
    "nt authority\\system",
    "nt authority\\network service",
    "nt authority\\networkservice",
];

/// Whether `account` authenticates on the network as the machine account.
pub fn is_machine_class(account: &str, platform: HostPlatform) -> bool {
    let account = account.trim().to_ascii_lowercase();
    if account.is_empty() {
        return true;
    }
    if MACHINE_ACCOUNT_ALIASES.contains(&account.as_str()) || account.starts_with("nt service\\") {
        return true;
    }
    platform == HostPlatform::Linux && account == "mssql"
}

/// Login name partners should grant for this node, or `None` when a
/// machine-class account runs on a host with no known domain.
pub fn grant_identity(info: &ServerInfo) -> Option<String> {
    if !is_machine_class(&info.service_account, info.platform) {
        return Some(info.service_account.trim().to_string());
    }

    let domain = info.domain.as_deref()?.trim();
    if domain.is_empty() {
        return None;
    }
    let host = info.fqdn.split('.').next().unwrap_or(&info.fqdn);
    Some(format!("{}\\{}$", domain.to_ascii_uppercase(), host.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Edition;

    fn info(account: &str, domain: Option<&str>, platform: HostPlatform) -> ServerInfo {
        ServerInfo {
            version: "15.0.2000.5".into(),
            edition: Edition::new("Developer Edition"),
            service_account: account.into(),
            fqdn: "sql-b.corp.local".into(),
            domain: domain.map(String::from),
            platform,
        }
    }

    #[test]
    fn test_domain_account_is_granted_as_is() {
        let i = info("CORP\\svc-sql", Some("corp"), HostPlatform::Windows);
        assert_eq!(grant_identity(&i), Some("CORP\\svc-sql".to_string()));
    }

    #[test]
    fn test_local_system_maps_to_machine_account() {
        let i = info("LocalSystem", Some("corp"), HostPlatform::Windows);
        assert_eq!(grant_identity(&i), Some("CORP\\SQL-B$".to_string()));

        let i = info("NT Service\\MSSQLSERVER", Some("corp"), HostPlatform::Windows);
        assert_eq!(grant_identity(&i), Some("CORP\\SQL-B$".to_string()));
    }

    #[test]
    fn test_linux_service_account_maps_to_machine_account() {
        let i = info("mssql", Some("CORP"), HostPlatform::Linux);
        assert_eq!(grant_identity(&i), Some("CORP\\SQL-B$".to_string()));

        // the same name on Windows is an ordinary local account
        let i = info("mssql", Some("CORP"), HostPlatform::Windows);
        assert_eq!(grant_identity(&i), Some("mssql".to_string()));
    }

    #[test]
    fn test_machine_account_without_domain_is_unresolvable() {
        let i = info("LocalSystem", None, HostPlatform::Windows);
        assert_eq!(grant_identity(&i), None);
    }
}
