//! Database connection helpers for Postgres and MySQL
//!
//! `db-helpers` turns a [`ConnectionConfig`] into a pinged connection pool:
//!
//! * **Validated configuration**: JSON or builder-style, checked up front
//! * **Connection strings**: Postgres URLs and MySQL DSNs, with TLS
//! * **TLS**: CA pinning, optional hostname skipping that still verifies the chain
//! * **Retry**: fixed-interval retry of network failures while the database starts
//!
//! # Example
//!
//! ```no_run
//! use db_helpers::{ConnectionConfig, PoolOpener, RetriableConnector};
//!
//! #[tokio::main]
//! async fn main() -> db_helpers::Result<()> {
//!     let config = ConnectionConfig::new("postgres", "127.0.0.1", 5432, "postgres")
//!         .with_password("secret")
//!         .with_database("app");
//!     config.validate()?;
//!
//!     let pool = RetriableConnector::new(PoolOpener::with_default_adapter())
//!         .get_connection_pool(&config)
//!         .await?;
//!
//!     let rows = pool.execute("DELETE FROM sessions WHERE expired").await?;
//!     println!("removed {} sessions", rows);
//!     pool.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod dsn;
pub mod error;
pub mod metrics;

pub use config::{ConnectionConfig, DatabaseType};
pub use connection::{
    Connect, DbPool, DbTransaction, MySqlTlsConfig, PoolOpener, RetriableConnector, Sleeper,
    SleeperFn, SslMode, TokioSleeper,
};
pub use dsn::{ConnectionStringBuilder, DsnBuilder, MySqlAdapter, MySqlDriverAdapter};
pub use error::{Error, ErrorKind, Result};

/// Open a pool for `config` with a fresh MySQL adapter, retrying network
/// failures with the default limits.
pub async fn get_connection_pool(config: &ConnectionConfig) -> Result<DbPool> {
    RetriableConnector::new(PoolOpener::with_default_adapter())
        .get_connection_pool(config)
        .await
}
