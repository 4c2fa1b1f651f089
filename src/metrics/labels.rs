//! Label keys and fixed label values

/// Database type label key
pub const DB_TYPE: &str = "db_type";
/// Operation label key
pub const OPERATION: &str = "operation";
/// Error kind label key
pub const KIND: &str = "kind";

/// `Exec`
pub const OP_EXEC: &str = "exec";
/// Single-row query
pub const OP_QUERY_ROW: &str = "query_row";
/// Streaming query
pub const OP_QUERY: &str = "query";
/// Transaction start
pub const OP_BEGIN: &str = "begin";
/// Transaction commit
pub const OP_COMMIT: &str = "commit";
/// Transaction rollback
pub const OP_ROLLBACK: &str = "rollback";

/// Retriable failure
pub const KIND_RETRIABLE: &str = "retriable";
/// Fatal failure
pub const KIND_FATAL: &str = "fatal";
