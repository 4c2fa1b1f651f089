//! Histogram metrics (durations in seconds)

use super::labels;
use std::time::Duration;

/// Time spent opening and pinging a pool
pub fn connect_duration(db_type: &'static str, duration: Duration) {
    metrics::histogram!("db_helpers_connect_duration_seconds", labels::DB_TYPE => db_type)
        .record(duration.as_secs_f64());
}

/// Time spent in a pool or transaction operation
pub fn query_duration(db_type: &'static str, operation: &'static str, duration: Duration) {
    metrics::histogram!(
        "db_helpers_query_duration_seconds",
        labels::DB_TYPE => db_type,
        labels::OPERATION => operation
    )
    .record(duration.as_secs_f64());
}
