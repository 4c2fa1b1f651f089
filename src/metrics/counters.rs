//! Counter metrics

use super::labels;
use crate::ErrorKind;

/// A connection attempt was started
pub fn connect_attempted(db_type: &'static str) {
    metrics::counter!("db_helpers_connect_attempts_total", labels::DB_TYPE => db_type).increment(1);
}

/// A failed connection attempt is being retried
pub fn connect_retried(db_type: &'static str) {
    metrics::counter!("db_helpers_connect_retries_total", labels::DB_TYPE => db_type).increment(1);
}

/// A connection attempt failed
pub fn connect_failed(db_type: &'static str, kind: ErrorKind) {
    let kind = match kind {
        ErrorKind::Retriable => labels::KIND_RETRIABLE,
        ErrorKind::Fatal => labels::KIND_FATAL,
    };
    metrics::counter!(
        "db_helpers_connect_failures_total",
        labels::DB_TYPE => db_type,
        labels::KIND => kind
    )
    .increment(1);
}

/// A pool or transaction operation ran
pub fn query_executed(db_type: &'static str, operation: &'static str) {
    metrics::counter!(
        "db_helpers_queries_total",
        labels::DB_TYPE => db_type,
        labels::OPERATION => operation
    )
    .increment(1);
}

/// A pool or transaction operation failed
pub fn query_failed(db_type: &'static str, operation: &'static str) {
    metrics::counter!(
        "db_helpers_query_errors_total",
        labels::DB_TYPE => db_type,
        labels::OPERATION => operation
    )
    .increment(1);
}
