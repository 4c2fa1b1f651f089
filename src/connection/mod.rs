//! Connection management
//!
//! This module handles:
//! * TLS material (CA loading, MySQL TLS configurations)
//! * Peer certificate verification without hostname checks
//! * Opening and pinging pools
//! * Bounded retry with an explicit state machine

mod pool;
mod retry;
mod state;
mod tls;
mod verifier;

pub use pool::{DbPool, DbTransaction, PoolOpener};
pub use retry::{
    Connect, RetriableConnector, Sleeper, SleeperFn, TokioSleeper, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_INTERVAL,
};
pub use state::{Outcome, RetryState};
pub use tls::{
    load_ca_certificates, root_store_from_pem, CaCertificates, MySqlTlsConfig,
    MySqlTlsConfigBuilder, SslMode,
};
pub use verifier::{verify_certificates_ignore_hostname, HostnameSkippingVerifier};
