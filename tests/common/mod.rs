//! Shared helpers for tests that need a live database
//!
//! The `DB` environment variable selects the server:
//! * `postgres` (default): `postgres@127.0.0.1:5432`
//! * `mysql`: `root:password@127.0.0.1:3306`

#![allow(dead_code)]

use db_helpers::{ConnectionConfig, DbPool, PoolOpener};
use std::sync::atomic::{AtomicU32, Ordering};

/// Database type selected by `DB`
pub fn db_type() -> String {
    std::env::var("DB").unwrap_or_else(|_| "postgres".to_string())
}

/// Configuration for the server selected by `DB`, without a database name
pub fn db_config() -> ConnectionConfig {
    match db_type().as_str() {
        "mysql" => {
            ConnectionConfig::new("mysql", "127.0.0.1", 3306, "root").with_password("password")
        }
        other => ConnectionConfig::new(other, "127.0.0.1", 5432, "postgres"),
    }
}

/// A database name unique to this test process
pub fn unique_database_name(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn server_pool() -> DbPool {
    PoolOpener::with_default_adapter()
        .open(&db_config())
        .await
        .expect("connect to test server")
}

/// Create `name` and return a configuration pointing at it
pub async fn create_database(name: &str) -> ConnectionConfig {
    let pool = server_pool().await;
    pool.execute(&format!("CREATE DATABASE {}", name))
        .await
        .expect("create database");
    pool.close().await;
    db_config().with_database(name)
}

/// Drop `name` if it exists
pub async fn drop_database(name: &str) {
    let pool = server_pool().await;
    pool.execute(&format!("DROP DATABASE IF EXISTS {}", name))
        .await
        .expect("drop database");
    pool.close().await;
}

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
