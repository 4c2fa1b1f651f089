//! Postgres connection URLs

use super::{join_host_port, DsnBuilder};
use crate::config::ConnectionConfig;
use crate::connection::SslMode;
use crate::{Error, Result};

/// Builds `postgres://` URLs.
///
/// `sslmode` follows the configuration: `disable` without TLS, `require` when
/// the hostname is not validated, `verify-full` (with `sslrootcert`) otherwise.
/// `connect_timeout` is given in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDsnBuilder;

impl DsnBuilder for PostgresDsnBuilder {
    fn build(&self, config: &ConnectionConfig) -> Result<String> {
        config.check_timeout()?;

        let sslmode = SslMode::for_config(config.require_ssl, config.skip_hostname_validation);
        let connect_timeout_ms = config.timeout.saturating_mul(1000);

        let mut url = format!(
            "postgres://{}:{}@{}/{}?sslmode={}&connect_timeout={}",
            config.user,
            config.password,
            join_host_port(&config.host, config.port),
            config.database_name,
            sslmode,
            connect_timeout_ms
        );

        if sslmode == SslMode::VerifyFull {
            if config.ca_cert.is_empty() {
                return Err(Error::Config(
                    "ca cert path is required when sslmode is verify-full".into(),
                ));
            }
            url.push_str("&sslrootcert=");
            url.push_str(&config.ca_cert);
        }

        Ok(url)
    }
}
