//! Per-slot connection factory

use std::sync::Arc;

use async_trait::async_trait;
use basalt_core::{Connection, ConnectionFactory, Result};

use crate::connection::PostgresConnection;

/// Connection parameters for a PostgreSQL database
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    host: String,
    port: u16,
    database: String,
    user: Option<String>,
    password: Option<String>,
    application_name: Option<String>,
}

impl PostgresConfig {
    /// Create a configuration for the given host and database
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            database: database.into(),
            user: None,
            password: None,
            application_name: None,
        }
    }

    /// Set the server port (default 5432)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the user to authenticate as
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password to authenticate with
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the application name reported to the server
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }
}

/// Factory producing one independent PostgreSQL connection per pool slot
pub struct PostgresFactory {
    config: PostgresConfig,
}

impl PostgresFactory {
    /// Create a factory from connection parameters
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    /// Get the connection parameters
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionFactory for PostgresFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let conn = PostgresConnection::connect(&self.config).await?;
        Ok(Arc::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PostgresConfig::new("localhost", "app");
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 5432);
        assert_eq!(config.database(), "app");
        assert!(config.user().is_none());
        assert!(config.password().is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = PostgresConfig::new("db.internal", "app")
            .with_port(5433)
            .with_user("svc")
            .with_password("secret")
            .with_application_name("basalt");

        assert_eq!(config.port(), 5433);
        assert_eq!(config.user(), Some("svc"));
        assert_eq!(config.password(), Some("secret"));
        assert_eq!(config.application_name(), Some("basalt"));
    }
}
