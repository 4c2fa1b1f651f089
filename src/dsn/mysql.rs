//! MySQL data source names
//!
//! Supported format:
//! * `[user[:password]@][net[(addr)]]/dbname[?param1=value1&paramN=valueN]`
//!
//! MySQL DSNs reference TLS settings by name only, so building a TLS DSN
//! registers a [`MySqlTlsConfig`] with a [`MySqlAdapter`] first.

use super::{join_host_port, DsnBuilder};
use crate::config::ConnectionConfig;
use crate::connection::MySqlTlsConfig;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

const DEFAULT_NET: &str = "tcp";
const DEFAULT_TCP_ADDR: &str = "127.0.0.1:3306";

/// TLS values with a fixed meaning in the `tls` parameter
const RESERVED_TLS_NAMES: [&str; 4] = ["true", "false", "skip-verify", "preferred"];

/// Structured form of a MySQL DSN
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MySqlDsn {
    /// Username
    pub user: String,
    /// Password
    pub passwd: String,
    /// Network type (`tcp`, `unix`)
    pub net: String,
    /// Network address (`host:port` or socket path)
    pub addr: String,
    /// Database name
    pub db_name: String,
    /// `parseTime` parameter
    pub parse_time: bool,
    /// `timeout` (dial timeout)
    pub timeout: Option<Duration>,
    /// `readTimeout`
    pub read_timeout: Option<Duration>,
    /// `writeTimeout`
    pub write_timeout: Option<Duration>,
    /// `tls` parameter: `true`, `false`, `skip-verify`, `preferred` or a registered name
    pub tls: Option<String>,
    /// Any other parameters, preserved verbatim
    pub params: BTreeMap<String, String>,
}

impl MySqlDsn {
    /// Split `addr` into host and port (default 3306)
    pub fn host_port(&self) -> Result<(&str, u16)> {
        match self.addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    Error::ConnectionString(format!("invalid port in address '{}'", self.addr))
                })?;
                Ok((host.trim_start_matches('[').trim_end_matches(']'), port))
            }
            None => Ok((self.addr.as_str(), 3306)),
        }
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "parseTime" => self.parse_time = parse_bool(value)?,
            "timeout" => self.timeout = Some(parse_duration(key, value)?),
            "readTimeout" => self.read_timeout = Some(parse_duration(key, value)?),
            "writeTimeout" => self.write_timeout = Some(parse_duration(key, value)?),
            "tls" => self.tls = Some(value.to_string()),
            _ => {
                self.params.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }
}

impl FromStr for MySqlDsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut dsn = MySqlDsn::default();

        let Some(slash) = s.rfind('/') else {
            if s.is_empty() {
                return Ok(normalized(dsn));
            }
            return Err(Error::ConnectionString(
                "invalid DSN: missing the slash separating the database name".into(),
            ));
        };
        let (head, tail) = (&s[..slash], &s[slash + 1..]);

        let net_addr = match head.rfind('@') {
            Some(at) => {
                let credentials = &head[..at];
                match credentials.split_once(':') {
                    Some((user, passwd)) => {
                        dsn.user = user.to_string();
                        dsn.passwd = passwd.to_string();
                    }
                    None => dsn.user = credentials.to_string(),
                }
                &head[at + 1..]
            }
            None => head,
        };

        match net_addr.split_once('(') {
            Some((net, rest)) => {
                let addr = rest.strip_suffix(')').ok_or_else(|| {
                    Error::ConnectionString(
                        "invalid DSN: network address not terminated (missing closing brace)"
                            .into(),
                    )
                })?;
                dsn.net = net.to_string();
                dsn.addr = addr.to_string();
            }
            None => dsn.net = net_addr.to_string(),
        }

        let (db_name, query) = tail.split_once('?').unwrap_or((tail, ""));
        dsn.db_name = db_name.to_string();

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            if let Some((key, value)) = pair.split_once('=') {
                dsn.set_param(key, value)?;
            }
        }

        Ok(normalized(dsn))
    }
}

fn normalized(mut dsn: MySqlDsn) -> MySqlDsn {
    if dsn.net.is_empty() {
        dsn.net = DEFAULT_NET.to_string();
    }
    if dsn.addr.is_empty() && dsn.net == DEFAULT_NET {
        dsn.addr = DEFAULT_TCP_ADDR.to_string();
    }
    dsn
}

impl std::fmt::Display for MySqlDsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.user.is_empty() || !self.passwd.is_empty() {
            f.write_str(&self.user)?;
            if !self.passwd.is_empty() {
                write!(f, ":{}", self.passwd)?;
            }
            f.write_str("@")?;
        }

        f.write_str(&self.net)?;
        if !self.addr.is_empty() {
            write!(f, "({})", self.addr)?;
        }
        write!(f, "/{}", self.db_name)?;

        // Parameters are written in key order.
        let mut params: BTreeMap<&str, String> = self
            .params
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        if self.parse_time {
            params.insert("parseTime", "true".into());
        }
        if let Some(timeout) = self.timeout {
            params.insert("timeout", format_duration(timeout));
        }
        if let Some(timeout) = self.read_timeout {
            params.insert("readTimeout", format_duration(timeout));
        }
        if let Some(timeout) = self.write_timeout {
            params.insert("writeTimeout", format_duration(timeout));
        }
        if let Some(tls) = &self.tls {
            params.insert("tls", tls.clone());
        }

        for (i, (key, value)) in params.iter().enumerate() {
            let separator = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", separator, key, value)?;
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(Error::ConnectionString(format!(
            "invalid DSN: invalid bool value: {}",
            value
        ))),
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let invalid = || {
        Error::ConnectionString(format!(
            "invalid DSN: invalid duration '{}' for {}",
            value, key
        ))
    };

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().map_err(|_| invalid())?;

    match unit {
        "ns" => Ok(Duration::from_nanos(amount)),
        "us" | "µs" => Ok(Duration::from_micros(amount)),
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
        _ => Err(invalid()),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// Name under which a database's TLS configuration is registered
pub fn tls_config_name(database_name: &str) -> String {
    format!("{}-tls", database_name)
}

/// DSN parsing/formatting and the named TLS registry of the MySQL driver.
///
/// Builders depend on this trait rather than on the driver so that tests can
/// substitute the parser and observe registrations.
pub trait MySqlAdapter: Send + Sync {
    /// Parse a DSN string
    fn parse_dsn(&self, dsn: &str) -> Result<MySqlDsn>;

    /// Serialize a DSN
    fn format_dsn(&self, dsn: &MySqlDsn) -> String {
        dsn.to_string()
    }

    /// Register `config` under `name`, replacing any previous registration
    fn register_tls_config(&self, name: &str, config: MySqlTlsConfig) -> Result<()>;

    /// Remove the registration for `name`, if any
    fn deregister_tls_config(&self, name: &str);

    /// Look up a registration
    fn tls_config(&self, name: &str) -> Option<MySqlTlsConfig>;
}

/// Production [`MySqlAdapter`] with an owned TLS registry.
#[derive(Debug, Default)]
pub struct MySqlDriverAdapter {
    tls_configs: RwLock<HashMap<String, MySqlTlsConfig>>,
}

impl MySqlDriverAdapter {
    /// Create an adapter with an empty registry
    pub fn new() -> Self {
        Self::default()
    }
}

impl MySqlAdapter for MySqlDriverAdapter {
    fn parse_dsn(&self, dsn: &str) -> Result<MySqlDsn> {
        dsn.parse()
    }

    fn register_tls_config(&self, name: &str, config: MySqlTlsConfig) -> Result<()> {
        if RESERVED_TLS_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
            return Err(Error::Config(format!("key '{}' is reserved", name)));
        }
        self.tls_configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), config);
        Ok(())
    }

    fn deregister_tls_config(&self, name: &str) {
        self.tls_configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn tls_config(&self, name: &str) -> Option<MySqlTlsConfig> {
        self.tls_configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Builds MySQL DSNs, registering TLS configurations as needed.
#[derive(Debug)]
pub struct MySqlDsnBuilder<A> {
    adapter: Arc<A>,
}

impl<A: MySqlAdapter> MySqlDsnBuilder<A> {
    /// Use `adapter` for parsing, formatting and TLS registration
    pub fn new(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// The underlying adapter
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }
}

impl<A: MySqlAdapter> DsnBuilder for MySqlDsnBuilder<A> {
    fn build(&self, config: &ConnectionConfig) -> Result<String> {
        config.check_timeout()?;

        let base = format!(
            "{}:{}@tcp({})/{}?parseTime=true",
            config.user,
            config.password,
            join_host_port(&config.host, config.port),
            config.database_name
        );
        let mut dsn = self
            .adapter
            .parse_dsn(&base)
            .map_err(|e| Error::ConnectionString(format!("parsing db connection string: {}", e)))?;

        let timeout = Duration::from_secs(config.timeout as u64);
        dsn.timeout = Some(timeout);
        dsn.read_timeout = Some(timeout);
        dsn.write_timeout = Some(timeout);

        if config.require_ssl {
            let tls = MySqlTlsConfig::builder()
                .ca_cert_path(config.ca_cert.as_str())
                .skip_hostname_validation(config.skip_hostname_validation)
                .build()?;

            let name = tls_config_name(&config.database_name);
            self.adapter
                .register_tls_config(&name, tls)
                .map_err(|e| Error::Config(format!("registering mysql tls config: {}", e)))?;
            dsn.tls = Some(name);
        }

        Ok(self.adapter.format_dsn(&dsn))
    }
}
