//! Opening and using connection pools
//!
//! [`PoolOpener`] turns a [`ConnectionConfig`] into a pinged [`DbPool`]. The
//! pool is opened lazily, so the ping is the first real network round trip
//! and the only place failures are classified as retriable.

use super::retry::Connect;
use super::tls::MySqlTlsConfig;
use crate::config::{ConnectionConfig, DatabaseType};
use crate::dsn::{ConnectionStringBuilder, MySqlAdapter, MySqlDriverAdapter, MySqlDsn};
use crate::metrics::{self, labels};
use crate::{Error, Result};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, Postgres};
use sqlx::{Connection, Decode, Type};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An open, pinged connection pool.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    /// Postgres pool
    Postgres(PgPool),
    /// MySQL pool
    MySql(MySqlPool),
}

impl DbPool {
    /// Database type of this pool
    pub fn database_type(&self) -> DatabaseType {
        match self {
            DbPool::Postgres(_) => DatabaseType::Postgres,
            DbPool::MySql(_) => DatabaseType::MySql,
        }
    }

    /// Driver name, equal to the configuration's `type`
    pub fn driver_name(&self) -> &'static str {
        self.database_type().as_str()
    }

    /// Raw Postgres pool
    pub fn as_postgres(&self) -> Option<&PgPool> {
        match self {
            DbPool::Postgres(pool) => Some(pool),
            DbPool::MySql(_) => None,
        }
    }

    /// Raw MySQL pool
    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            DbPool::MySql(pool) => Some(pool),
            DbPool::Postgres(_) => None,
        }
    }

    /// Acquire a connection and ping the server
    pub async fn ping(&self) -> std::result::Result<(), sqlx::Error> {
        match self {
            DbPool::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await
            }
            DbPool::MySql(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await
            }
        }
    }

    /// Close every connection and reject further acquisitions
    pub async fn close(&self) {
        tracing::debug!(driver = self.driver_name(), "closing connection pool");
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::MySql(pool) => pool.is_closed(),
        }
    }

    /// Connections currently established, idle or in use
    pub fn open_connections(&self) -> u32 {
        match self {
            DbPool::Postgres(pool) => pool.size(),
            DbPool::MySql(pool) => pool.size(),
        }
    }

    /// Publish [`open_connections`](Self::open_connections) as a gauge
    pub fn record_open_connections(&self) {
        metrics::gauges::open_connections(self.driver_name(), self.open_connections());
    }

    /// Run a statement, returning the number of affected rows
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let started = Instant::now();
        let result = match self {
            DbPool::Postgres(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
            DbPool::MySql(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .map(|done| done.rows_affected()),
        };
        monitored(self.driver_name(), labels::OP_EXEC, started, result)
    }

    /// Run a query returning at most one row, decoding its first column
    pub async fn fetch_optional_scalar<T>(&self, sql: &str) -> Result<Option<T>>
    where
        T: for<'r> Decode<'r, Postgres>
            + Type<Postgres>
            + for<'r> Decode<'r, MySql>
            + Type<MySql>
            + Send
            + Unpin,
    {
        let started = Instant::now();
        let result = match self {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<Postgres, T>(sql)
                    .fetch_optional(pool)
                    .await
            }
            DbPool::MySql(pool) => sqlx::query_scalar::<MySql, T>(sql).fetch_optional(pool).await,
        };
        monitored(self.driver_name(), labels::OP_QUERY_ROW, started, result)
    }

    /// Stream the first column of every row
    pub fn fetch_scalars<'a, T>(&'a self, sql: &'a str) -> BoxStream<'a, Result<T>>
    where
        T: for<'r> Decode<'r, Postgres>
            + Type<Postgres>
            + for<'r> Decode<'r, MySql>
            + Type<MySql>
            + Send
            + Unpin
            + 'a,
    {
        let db_type = self.driver_name();
        metrics::counters::query_executed(db_type, labels::OP_QUERY);

        let rows = match self {
            DbPool::Postgres(pool) => sqlx::query_scalar::<Postgres, T>(sql).fetch(pool),
            DbPool::MySql(pool) => sqlx::query_scalar::<MySql, T>(sql).fetch(pool),
        };
        rows.map_err(move |source| {
            metrics::counters::query_failed(db_type, labels::OP_QUERY);
            Error::Database {
                msg: labels::OP_QUERY,
                source,
            }
        })
        .boxed()
    }

    /// Start a transaction
    pub async fn begin(&self) -> Result<DbTransaction> {
        tracing::debug!(driver = self.driver_name(), "beginning transaction");
        let started = Instant::now();
        let result = match self {
            DbPool::Postgres(pool) => pool.begin().await.map(DbTransaction::Postgres),
            DbPool::MySql(pool) => pool.begin().await.map(DbTransaction::MySql),
        };
        monitored(self.driver_name(), labels::OP_BEGIN, started, result)
    }
}

/// A transaction on a [`DbPool`].
///
/// Dropping it without [`commit`](Self::commit) rolls it back.
pub enum DbTransaction {
    /// Postgres transaction
    Postgres(sqlx::Transaction<'static, Postgres>),
    /// MySQL transaction
    MySql(sqlx::Transaction<'static, MySql>),
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbTransaction")
            .field(&self.driver_name())
            .finish()
    }
}

impl DbTransaction {
    /// Driver name of the owning pool
    pub fn driver_name(&self) -> &'static str {
        match self {
            DbTransaction::Postgres(_) => DatabaseType::Postgres.as_str(),
            DbTransaction::MySql(_) => DatabaseType::MySql.as_str(),
        }
    }

    /// Run a statement inside the transaction
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let db_type = self.driver_name();
        let started = Instant::now();
        let result = match self {
            DbTransaction::Postgres(tx) => sqlx::query(sql)
                .execute(&mut **tx)
                .await
                .map(|done| done.rows_affected()),
            DbTransaction::MySql(tx) => sqlx::query(sql)
                .execute(&mut **tx)
                .await
                .map(|done| done.rows_affected()),
        };
        monitored(db_type, labels::OP_EXEC, started, result)
    }

    /// Commit
    pub async fn commit(self) -> Result<()> {
        let db_type = self.driver_name();
        let started = Instant::now();
        let result = match self {
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::MySql(tx) => tx.commit().await,
        };
        monitored(db_type, labels::OP_COMMIT, started, result)
    }

    /// Roll back
    pub async fn rollback(self) -> Result<()> {
        let db_type = self.driver_name();
        let started = Instant::now();
        let result = match self {
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::MySql(tx) => tx.rollback().await,
        };
        monitored(db_type, labels::OP_ROLLBACK, started, result)
    }
}

/// Count and time an operation, wrapping driver errors
fn monitored<T>(
    db_type: &'static str,
    operation: &'static str,
    started: Instant,
    result: std::result::Result<T, sqlx::Error>,
) -> Result<T> {
    metrics::counters::query_executed(db_type, operation);
    metrics::histograms::query_duration(db_type, operation, started.elapsed());
    result.map_err(|source| {
        metrics::counters::query_failed(db_type, operation);
        Error::Database {
            msg: operation,
            source,
        }
    })
}

/// Longest acquire timeout handed to the pool; its deadline must fit in an `Instant`
const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(u32::MAX as u64);

fn acquire_timeout(timeout: Duration) -> Duration {
    timeout.min(MAX_ACQUIRE_TIMEOUT)
}

/// Network-level failures: the server may simply not be up yet
pub(crate) fn is_network_error(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

fn ping_error(source: sqlx::Error) -> Error {
    if is_network_error(&source) {
        Error::Retriable {
            msg: "unable to ping",
            source,
        }
    } else {
        Error::Database {
            msg: "unable to ping",
            source,
        }
    }
}

fn open_error(source: sqlx::Error) -> Error {
    Error::Database {
        msg: "unable to open database connection",
        source,
    }
}

/// Opens pinged pools from configurations.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> db_helpers::Result<()> {
/// use db_helpers::{ConnectionConfig, PoolOpener};
///
/// let config = ConnectionConfig::new("mysql", "127.0.0.1", 3306, "root")
///     .with_password("password")
///     .with_database("app");
/// let pool = PoolOpener::with_default_adapter().open(&config).await?;
/// let one: Option<i64> = pool.fetch_optional_scalar("SELECT 1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PoolOpener<A> {
    builder: ConnectionStringBuilder<A>,
}

impl<A: MySqlAdapter> PoolOpener<A> {
    /// Use `adapter` for MySQL DSNs and TLS registrations
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            builder: ConnectionStringBuilder::new(adapter),
        }
    }

    /// The adapter holding TLS registrations
    pub fn adapter(&self) -> &Arc<A> {
        self.builder.adapter()
    }

    /// Build the connection string, open a pool and ping it.
    ///
    /// # Errors
    ///
    /// Ping failures caused by the network are [`Error::Retriable`]; all other
    /// failures are fatal. The pool is closed before an error is returned.
    pub async fn open(&self, config: &ConnectionConfig) -> Result<DbPool> {
        let started = Instant::now();
        let db_type = config
            .database_type()
            .map(|t| t.as_str())
            .unwrap_or("unknown");
        metrics::counters::connect_attempted(db_type);

        let result = self.open_and_ping(config).await;
        match &result {
            Ok(_) => metrics::histograms::connect_duration(db_type, started.elapsed()),
            Err(err) => metrics::counters::connect_failed(db_type, err.kind()),
        }
        result
    }

    async fn open_and_ping(&self, config: &ConnectionConfig) -> Result<DbPool> {
        let connection_string = self
            .builder
            .build(config)
            .map_err(|e| e.context("failed to create connection string"))?;

        let db_type = config.database_type()?;
        let timeout = Duration::from_secs(config.timeout as u64);
        let pool = self.open_lazy(db_type, &connection_string, timeout)?;

        if let Err(source) = pool.ping().await {
            pool.close().await;
            return Err(ping_error(source));
        }
        Ok(pool)
    }

    fn open_lazy(&self, db_type: DatabaseType, dsn: &str, timeout: Duration) -> Result<DbPool> {
        match db_type {
            DatabaseType::Postgres => {
                let options = PgConnectOptions::from_str(dsn).map_err(open_error)?;
                let pool = PgPoolOptions::new()
                    .acquire_timeout(acquire_timeout(timeout))
                    .connect_lazy_with(options);
                Ok(DbPool::Postgres(pool))
            }
            DatabaseType::MySql => {
                let dsn = self
                    .adapter()
                    .parse_dsn(dsn)
                    .map_err(|e| e.context("unable to open database connection"))?;
                let options = mysql_connect_options(&dsn, self.adapter().as_ref())
                    .map_err(|e| e.context("unable to open database connection"))?;
                let pool = MySqlPoolOptions::new()
                    .acquire_timeout(acquire_timeout(dsn.timeout.unwrap_or(timeout)))
                    .connect_lazy_with(options);
                Ok(DbPool::MySql(pool))
            }
        }
    }
}

impl PoolOpener<MySqlDriverAdapter> {
    /// Opener backed by a fresh [`MySqlDriverAdapter`]
    pub fn with_default_adapter() -> Self {
        Self::new(Arc::new(MySqlDriverAdapter::new()))
    }
}

impl<A: MySqlAdapter> Connect for PoolOpener<A> {
    type Handle = DbPool;

    fn connect(&self, config: &ConnectionConfig) -> impl Future<Output = Result<DbPool>> + Send {
        self.open(config)
    }
}

/// Translate a parsed DSN into driver options, resolving named TLS settings
pub(crate) fn mysql_connect_options<A>(dsn: &MySqlDsn, adapter: &A) -> Result<MySqlConnectOptions>
where
    A: MySqlAdapter + ?Sized,
{
    let mut options = MySqlConnectOptions::new().username(&dsn.user);
    options = if dsn.net == "unix" {
        options.socket(&dsn.addr)
    } else {
        let (host, port) = dsn.host_port()?;
        options.host(host).port(port)
    };
    if !dsn.passwd.is_empty() {
        options = options.password(&dsn.passwd);
    }
    if !dsn.db_name.is_empty() {
        options = options.database(&dsn.db_name);
    }
    if let Some(charset) = dsn.params.get("charset") {
        options = options.charset(charset);
    }

    let (mode, registered) = mysql_tls_mode(dsn.tls.as_deref(), adapter)?;
    options = options.ssl_mode(mode);
    if let Some(tls) = registered {
        options = options.ssl_ca_from_pem(tls.ca_pem().to_vec());
    }
    Ok(options)
}

/// Driver TLS mode for a DSN `tls` value, with the registration it names.
///
/// A registration that skips hostnames maps to `VERIFY_CA`: the chain and
/// validity period are checked against the registered CA, the hostname is not.
pub(crate) fn mysql_tls_mode<A>(
    tls: Option<&str>,
    adapter: &A,
) -> Result<(MySqlSslMode, Option<MySqlTlsConfig>)>
where
    A: MySqlAdapter + ?Sized,
{
    match tls {
        None | Some("false") => Ok((MySqlSslMode::Disabled, None)),
        Some("true") => Ok((MySqlSslMode::VerifyIdentity, None)),
        Some("skip-verify") => Ok((MySqlSslMode::Required, None)),
        Some("preferred") => Ok((MySqlSslMode::Preferred, None)),
        Some(name) => {
            let tls = adapter
                .tls_config(name)
                .ok_or_else(|| Error::Config(format!("tls config '{}' is not registered", name)))?;
            let mode = if tls.insecure_skip_verify() {
                MySqlSslMode::VerifyCa
            } else {
                MySqlSslMode::VerifyIdentity
            };
            Ok((mode, Some(tls)))
        }
    }
}
