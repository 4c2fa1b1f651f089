//! Database connection configuration
//!
//! [`ConnectionConfig`] is plain data, normally deserialized from a service's
//! JSON configuration file. The database type stays a string until a
//! connection string is built so that a bad timeout is reported before an
//! unsupported type.

use crate::connection::load_ca_certificates;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// PostgreSQL
    Postgres,
    /// MySQL
    MySql,
}

impl DatabaseType {
    /// Driver identifier, as used in configuration files and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            _ => Err(Error::Config(format!(
                "database type '{}' is not supported",
                s
            ))),
        }
    }
}

/// How to reach a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type (`postgres` or `mysql`)
    #[serde(rename = "type")]
    pub db_type: String,
    /// Username
    pub user: String,
    /// Password
    #[serde(default)]
    pub password: String,
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect/read/write timeout in seconds (must be at least 1)
    pub timeout: i64,
    /// Database name
    #[serde(default)]
    pub database_name: String,
    /// Require TLS
    #[serde(default)]
    pub require_ssl: bool,
    /// Path to the PEM-encoded CA certificate used when `require_ssl` is set
    #[serde(default)]
    pub ca_cert: String,
    /// Verify the certificate chain but not the host name
    #[serde(default)]
    pub skip_hostname_validation: bool,
}

impl ConnectionConfig {
    /// Create a configuration without TLS.
    ///
    /// # Examples
    ///
    /// ```
    /// use db_helpers::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::new("postgres", "127.0.0.1", 5432, "postgres")
    ///     .with_database("app")
    ///     .with_timeout(5);
    /// assert_eq!(config.timeout, 5);
    /// ```
    pub fn new(
        db_type: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
    ) -> Self {
        Self {
            db_type: db_type.into(),
            user: user.into(),
            host: host.into(),
            port,
            timeout: 5,
            ..Self::default()
        }
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database name
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Set the timeout in seconds
    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Require TLS, trusting the CA certificates in `ca_cert`
    pub fn with_ssl(mut self, ca_cert: impl Into<String>, skip_hostname_validation: bool) -> Self {
        self.require_ssl = true;
        self.ca_cert = ca_cert.into();
        self.skip_hostname_validation = skip_hostname_validation;
        self
    }

    /// Parsed database type
    pub fn database_type(&self) -> Result<DatabaseType> {
        self.db_type.parse()
    }

    /// Check the timeout invariant shared by every connection string builder.
    pub(crate) fn check_timeout(&self) -> Result<()> {
        if self.timeout < 1 {
            return Err(Error::Config(format!(
                "timeout must be at least 1 second: {}",
                self.timeout
            )));
        }
        Ok(())
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for the first invalid field. When
    /// `require_ssl` is set the CA file is read and must contain at least one
    /// PEM certificate.
    pub fn validate(&self) -> Result<()> {
        self.check_timeout()?;
        self.database_type()?;

        if self.user.is_empty() {
            return Err(Error::Config("user must not be empty".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".into()));
        }

        if self.require_ssl {
            load_ca_certificates(&self.ca_cert)?;
        }

        Ok(())
    }

    /// Deserialize from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("parsing db config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file, deserialize and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "reading db config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CA_PEM: &str = include_str!("../tests/fixtures/ca.pem");

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("postgres", "some-host", 1234, "some-user")
            .with_password("some-password")
            .with_database("some-database")
    }

    #[test]
    fn test_database_type_from_str() {
        assert_eq!(
            "postgres".parse::<DatabaseType>().unwrap(),
            DatabaseType::Postgres
        );
        assert_eq!("mysql".parse::<DatabaseType>().unwrap(), DatabaseType::MySql);
    }

    #[test]
    fn test_database_type_unsupported() {
        let err = "neither".parse::<DatabaseType>().unwrap_err();
        assert_eq!(err.to_string(), "database type 'neither' is not supported");
    }

    #[test]
    fn test_database_type_display() {
        assert_eq!(DatabaseType::Postgres.to_string(), "postgres");
        assert_eq!(DatabaseType::MySql.to_string(), "mysql");
    }

    #[test]
    fn test_validate_ok() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_checks_timeout_first() {
        let mut config = config().with_timeout(0);
        config.db_type = "neither".into();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "timeout must be at least 1 second: 0");
    }

    #[test]
    fn test_validate_required_fields() {
        let mut c = config();
        c.user.clear();
        assert!(c.validate().is_err());

        let mut c = config();
        c.host.clear();
        assert!(c.validate().is_err());

        let mut c = config();
        c.port = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_ssl_requires_readable_ca() {
        let c = config().with_ssl("/foo/bar", false);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("reading db ca cert file"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CA_PEM.as_bytes()).unwrap();
        let c = config().with_ssl(file.path().to_str().unwrap(), false);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "type": "mysql",
            "user": "root",
            "password": "password",
            "host": "127.0.0.1",
            "port": 3306,
            "timeout": 5,
            "database_name": "app"
        }"#;
        let config = ConnectionConfig::from_json(json).unwrap();
        assert_eq!(config.database_type().unwrap(), DatabaseType::MySql);
        assert_eq!(config.port, 3306);
        assert!(!config.require_ssl);
        assert!(config.ca_cert.is_empty());
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let json = r#"{"type": "mysql", "user": "root", "host": "h", "port": 1, "timeout": 0}"#;
        assert!(ConnectionConfig::from_json(json).is_err());

        assert!(ConnectionConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type":"postgres","user":"u","host":"h","port":5432,"timeout":3}}"#
        )
        .unwrap();
        let config = ConnectionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.timeout, 3);

        assert!(ConnectionConfig::from_json_file("/does/not/exist.json").is_err());
    }
}
