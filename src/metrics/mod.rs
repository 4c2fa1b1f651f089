//! Metrics emitted through the `metrics` facade
//!
//! Nothing is recorded unless the host application installs a recorder
//! (for example a Prometheus exporter).
//!
//! * `counters`: connection attempts, retries, failures, queries
//! * `histograms`: connect and query durations
//! * `gauges`: open connections per pool

pub mod counters;
pub mod gauges;
pub mod histograms;
pub mod labels;
