//! TLS configuration for secure database connections.
//!
//! Postgres TLS is configured entirely through the connection string
//! ([`SslMode`] plus `sslrootcert`). MySQL DSNs can only reference a TLS
//! configuration by name, so [`MySqlTlsConfig`] values are built here and
//! registered with a [`MySqlAdapter`](crate::dsn::MySqlAdapter).

use crate::{Error, Result};
use rustls::crypto::CryptoProvider;
use rustls::RootCertStore;
use std::fs;
use std::sync::Arc;

/// SSL/TLS connection mode matching the PostgreSQL `sslmode` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    /// No TLS (plaintext connection)
    #[default]
    Disable,
    /// TLS required, hostname not checked
    Require,
    /// TLS required, server certificate must be signed by a trusted CA and hostname must match
    VerifyFull,
}

impl SslMode {
    /// Mode for a configuration's `require_ssl` / `skip_hostname_validation` pair
    pub fn for_config(require_ssl: bool, skip_hostname_validation: bool) -> Self {
        match (require_ssl, skip_hostname_validation) {
            (false, _) => Self::Disable,
            (true, true) => Self::Require,
            (true, false) => Self::VerifyFull,
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Require => write!(f, "require"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "require" => Ok(Self::Require),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(Error::Config(format!(
                "invalid sslmode '{}': expected disable, require, or verify-full",
                s
            ))),
        }
    }
}

/// CA certificates loaded from a PEM file
#[derive(Debug, Clone)]
pub struct CaCertificates {
    /// Trust anchors accepted by rustls
    pub roots: Arc<RootCertStore>,
    /// Raw file contents, handed to drivers that take PEM directly
    pub pem: Arc<[u8]>,
}

/// Read `path` and collect every PEM certificate it contains.
///
/// Non-certificate PEM items and certificates rustls cannot use are skipped.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or if no certificate
/// could be added to the store.
pub fn load_ca_certificates(path: &str) -> Result<CaCertificates> {
    let pem =
        fs::read(path).map_err(|e| Error::Config(format!("reading db ca cert file: {}", e)))?;
    let roots = root_store_from_pem(&pem)?;
    Ok(CaCertificates {
        roots: Arc::new(roots),
        pem: pem.into(),
    })
}

/// Build a root store from PEM bytes.
pub fn root_store_from_pem(pem: &[u8]) -> Result<RootCertStore> {
    let mut reader = std::io::Cursor::new(pem);
    let certs = rustls_pemfile::certs(&mut reader).filter_map(|cert| cert.ok());

    let mut root_store = RootCertStore::empty();
    let (added, _ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::Config(
            "appending cert to pool from pem - invalid cert bytes".into(),
        ));
    }

    Ok(root_store)
}

/// The crypto provider used for every client configuration built here.
pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// A named TLS configuration referenced from a MySQL DSN.
///
/// `insecure_skip_verify` mirrors the MySQL driver flag of the same name: the
/// hostname is not checked. The chain and validity period are still verified;
/// the pool opener maps such a registration to the driver's `VERIFY_CA` mode,
/// which performs the same check as [`verify_certificates_ignore_hostname`].
///
/// [`verify_certificates_ignore_hostname`]: super::verify_certificates_ignore_hostname
#[derive(Clone)]
pub struct MySqlTlsConfig {
    ca: CaCertificates,
    insecure_skip_verify: bool,
}

impl MySqlTlsConfig {
    /// Create a new TLS configuration builder.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let tls = MySqlTlsConfig::builder()
    ///     .ca_cert_path("/etc/ssl/db-ca.pem")
    ///     .skip_hostname_validation(true)
    ///     .build()?;
    /// ```
    pub fn builder() -> MySqlTlsConfigBuilder {
        MySqlTlsConfigBuilder::default()
    }

    /// Trusted roots
    pub fn root_certs(&self) -> &Arc<RootCertStore> {
        &self.ca.roots
    }

    /// PEM bytes the roots were loaded from
    pub fn ca_pem(&self) -> &[u8] {
        &self.ca.pem
    }

    /// Whether hostname verification is skipped
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }
}

impl std::fmt::Debug for MySqlTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlTlsConfig")
            .field("root_certs", &self.ca.roots.len())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish()
    }
}

/// Builder for [`MySqlTlsConfig`].
#[derive(Debug, Default)]
pub struct MySqlTlsConfigBuilder {
    ca_cert_path: Option<String>,
    skip_hostname_validation: bool,
}

impl MySqlTlsConfigBuilder {
    /// Path to the CA certificate file (PEM format).
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Skip hostname verification while still verifying the chain (default: false).
    pub fn skip_hostname_validation(mut self, skip: bool) -> Self {
        self.skip_hostname_validation = skip;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - no CA certificate path was given
    /// - the CA certificate file cannot be read
    /// - the file contains no usable PEM certificate
    pub fn build(self) -> Result<MySqlTlsConfig> {
        let path = self
            .ca_cert_path
            .ok_or_else(|| Error::Config("ca cert path is required for tls".into()))?;
        let ca = load_ca_certificates(&path)?;

        Ok(MySqlTlsConfig {
            ca,
            insecure_skip_verify: self.skip_hostname_validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CA_PEM: &str = include_str!("../../tests/fixtures/ca.pem");

    fn ca_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_ssl_mode_for_config() {
        assert_eq!(SslMode::for_config(false, false), SslMode::Disable);
        assert_eq!(SslMode::for_config(false, true), SslMode::Disable);
        assert_eq!(SslMode::for_config(true, true), SslMode::Require);
        assert_eq!(SslMode::for_config(true, false), SslMode::VerifyFull);
    }

    #[test]
    fn test_ssl_mode_from_str() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!(
            "verify-full".parse::<SslMode>().unwrap(),
            SslMode::VerifyFull
        );
        assert!("prefer".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_ssl_mode_display() {
        assert_eq!(SslMode::Disable.to_string(), "disable");
        assert_eq!(SslMode::Require.to_string(), "require");
        assert_eq!(SslMode::VerifyFull.to_string(), "verify-full");
    }

    #[test]
    fn test_load_ca_certificates() {
        let file = ca_file(CA_PEM.as_bytes());
        let ca = load_ca_certificates(file.path().to_str().unwrap()).unwrap();
        assert_eq!(ca.roots.len(), 1);
        assert_eq!(&*ca.pem, CA_PEM.as_bytes());
    }

    #[test]
    fn test_load_ca_certificates_missing_file() {
        let err = load_ca_certificates("/foo/bar").unwrap_err();
        assert!(err.to_string().starts_with("reading db ca cert file: "));
    }

    #[test]
    fn test_load_ca_certificates_bad_bytes() {
        let file = ca_file(b"bad cert");
        let err = load_ca_certificates(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "appending cert to pool from pem - invalid cert bytes"
        );
    }

    #[test]
    fn test_tls_config_verifies_hostname_by_default() {
        let file = ca_file(CA_PEM.as_bytes());
        let tls = MySqlTlsConfig::builder()
            .ca_cert_path(file.path().to_str().unwrap())
            .build()
            .unwrap();
        assert!(!tls.insecure_skip_verify());
        assert_eq!(tls.root_certs().len(), 1);
    }

    #[test]
    fn test_tls_config_skip_hostname_keeps_roots() {
        let file = ca_file(CA_PEM.as_bytes());
        let tls = MySqlTlsConfig::builder()
            .ca_cert_path(file.path().to_str().unwrap())
            .skip_hostname_validation(true)
            .build()
            .unwrap();
        assert!(tls.insecure_skip_verify());
        assert_eq!(tls.root_certs().len(), 1);
        assert_eq!(tls.ca_pem(), CA_PEM.as_bytes());
    }

    #[test]
    fn test_tls_config_requires_path() {
        assert!(MySqlTlsConfig::builder().build().is_err());
    }

    #[test]
    fn test_tls_config_debug() {
        let file = ca_file(CA_PEM.as_bytes());
        let tls = MySqlTlsConfig::builder()
            .ca_cert_path(file.path().to_str().unwrap())
            .build()
            .unwrap();
        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("MySqlTlsConfig"));
        assert!(debug_str.contains("insecure_skip_verify"));
    }
}
