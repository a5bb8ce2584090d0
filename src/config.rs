use std::collections::HashSet;

use serde::Deserialize;

use crate::access::parse_admin_allow_list;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Postgres URL. Without one the service runs on an in-memory store.
    pub database_url: Option<String>,
    /// Comma-separated emails allowed to see every affiliate's totals.
    pub affiliate_admin_emails: String,
    pub app_base_url: String,
    /// Page size when listing checkout sessions.
    pub checkout_session_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("server_port", 8000)?
            .set_default("affiliate_admin_emails", "")?
            .set_default("app_base_url", "http://localhost:3000")?
            .set_default("checkout_session_limit", 100)?
            .add_source(config::Environment::default())
            .build()?;
        config.try_deserialize()
    }

    pub fn admin_allow_list(&self) -> HashSet<String> {
        parse_admin_allow_list(&self.affiliate_admin_emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_admin_allow_list() {
        let config = Config {
            server_port: 8000,
            database_url: None,
            affiliate_admin_emails: "Ops@Clinic.com, billing@clinic.com".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
            checkout_session_limit: 100,
        };
        let admins = config.admin_allow_list();
        assert!(admins.contains("ops@clinic.com"));
        assert_eq!(admins.len(), 2);
    }
}
