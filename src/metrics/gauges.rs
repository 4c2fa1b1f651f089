//! Gauge metrics

use super::labels;

/// Connections currently held by a pool, idle or in use
pub fn open_connections(db_type: &'static str, count: u32) {
    metrics::gauge!("db_helpers_open_connections", labels::DB_TYPE => db_type)
        .set(f64::from(count));
}
