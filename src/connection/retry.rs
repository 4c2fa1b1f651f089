//! Bounded retry around connection opening
//!
//! Databases that are still starting up refuse connections for a while.
//! [`RetriableConnector`] retries attempts failing with a retriable error at a
//! fixed interval, up to `max_retries` attempts in total.

use super::state::{Outcome, RetryState};
use crate::config::ConnectionConfig;
use crate::metrics;
use crate::Result;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default pause between attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Something that can open a connection handle from a configuration.
pub trait Connect {
    /// Handle produced on success
    type Handle;

    /// Make one attempt
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// Pause between attempts.
pub trait Sleeper {
    /// Wait for `duration`
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Calls a function instead of sleeping
///
/// # Examples
///
/// ```
/// use db_helpers::SleeperFn;
/// use std::time::Duration;
///
/// let sleeper = SleeperFn(|d: Duration| println!("would sleep {:?}", d));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SleeperFn<F>(pub F);

impl<F> Sleeper for SleeperFn<F>
where
    F: Fn(Duration),
{
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (self.0)(duration);
        std::future::ready(())
    }
}

/// Retries a [`Connect`] implementation while it fails with retriable errors.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> db_helpers::Result<()> {
/// use db_helpers::{ConnectionConfig, PoolOpener, RetriableConnector};
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new("postgres", "127.0.0.1", 5432, "postgres");
/// let connector = RetriableConnector::new(PoolOpener::with_default_adapter())
///     .max_retries(10)
///     .retry_interval(Duration::from_secs(1));
/// let pool = connector.get_connection_pool(&config).await?;
/// # pool.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetriableConnector<C, S = TokioSleeper> {
    connector: C,
    sleeper: S,
    retry_interval: Duration,
    max_retries: u32,
}

impl<C: Connect> RetriableConnector<C, TokioSleeper> {
    /// Wrap `connector` with the default limits and the tokio sleeper
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sleeper: TokioSleeper,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl<C: Connect, S: Sleeper> RetriableConnector<C, S> {
    /// Set the pause between attempts
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the maximum number of attempts
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Replace the sleeper
    pub fn sleeper<S2: Sleeper>(self, sleeper: S2) -> RetriableConnector<C, S2> {
        RetriableConnector {
            connector: self.connector,
            sleeper,
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
        }
    }

    /// The wrapped connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect, retrying retriable failures.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or the last retriable error once
    /// `max_retries` attempts have been made.
    pub async fn get_connection_pool(&self, config: &ConnectionConfig) -> Result<C::Handle> {
        let db_type = config
            .database_type()
            .map(|t| t.as_str())
            .unwrap_or("unknown");

        let mut state = RetryState::start();
        loop {
            let result = self.connector.connect(config).await;
            state = state.next(Outcome::of(&result), self.max_retries);

            match state {
                RetryState::Attempting(next) => {
                    if let Err(err) = result {
                        tracing::warn!(
                            attempt = next - 1,
                            max_retries = self.max_retries,
                            error = %err,
                            "retrying database connection"
                        );
                    }
                    metrics::counters::connect_retried(db_type);
                    self.sleeper.sleep(self.retry_interval).await;
                }
                RetryState::Done => return result,
                RetryState::Failed => {
                    if let Err(err) = &result {
                        if err.is_retriable() {
                            tracing::warn!(
                                attempts = self.max_retries,
                                error = %err,
                                "giving up on database connection"
                            );
                        }
                    }
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Returns queued results in order, then always the fallback
    struct StubConnector {
        results: Mutex<VecDeque<Result<&'static str>>>,
        fallback: fn() -> Result<&'static str>,
        calls: Mutex<u32>,
    }

    impl StubConnector {
        fn new(results: Vec<Result<&'static str>>, fallback: fn() -> Result<&'static str>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                fallback,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl Connect for StubConnector {
        type Handle = &'static str;

        async fn connect(&self, _config: &ConnectionConfig) -> Result<&'static str> {
            *self.calls.lock().unwrap() += 1;
            let next = self.results.lock().unwrap().pop_front();
            next.unwrap_or_else(self.fallback)
        }
    }

    fn retriable() -> Result<&'static str> {
        Err(Error::Retriable {
            msg: "unable to ping",
            source: sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
        })
    }

    fn fatal() -> Result<&'static str> {
        Err(Error::Config("bad password".into()))
    }

    fn connected() -> Result<&'static str> {
        Ok("handle")
    }

    fn recording_sleeper() -> (SleeperFn<impl Fn(Duration)>, Arc<Mutex<Vec<Duration>>>) {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let recorded = sleeps.clone();
        let sleeper = SleeperFn(move |d| recorded.lock().unwrap().push(d));
        (sleeper, sleeps)
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("postgres", "127.0.0.1", 5432, "postgres")
    }

    #[tokio::test]
    async fn test_succeeds_after_k_retriable_failures() {
        let k = 3;
        let stub = StubConnector::new(vec![retriable(), retriable(), retriable()], connected);
        let (sleeper, sleeps) = recording_sleeper();
        let connector = RetriableConnector::new(stub)
            .max_retries(k + 2)
            .retry_interval(Duration::from_millis(250))
            .sleeper(sleeper);

        let handle = connector.get_connection_pool(&config()).await.unwrap();
        assert_eq!(handle, "handle");
        assert_eq!(connector.connector().calls(), k + 1);
        assert_eq!(
            *sleeps.lock().unwrap(),
            vec![Duration::from_millis(250); k as usize]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let m = 4;
        let stub = StubConnector::new(vec![], retriable);
        let (sleeper, sleeps) = recording_sleeper();
        let connector = RetriableConnector::new(stub)
            .max_retries(m)
            .retry_interval(Duration::from_secs(1))
            .sleeper(sleeper);

        let err = connector.get_connection_pool(&config()).await.unwrap_err();
        assert!(err.is_retriable());
        assert!(err.to_string().starts_with("unable to ping"));
        assert_eq!(connector.connector().calls(), m);
        assert_eq!(sleeps.lock().unwrap().len(), (m - 1) as usize);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let stub = StubConnector::new(vec![retriable(), fatal()], connected);
        let (sleeper, sleeps) = recording_sleeper();
        let connector = RetriableConnector::new(stub).max_retries(10).sleeper(sleeper);

        let err = connector.get_connection_pool(&config()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad password");
        assert_eq!(connector.connector().calls(), 2);
        assert_eq!(sleeps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_immediate_success_does_not_sleep() {
        let stub = StubConnector::new(vec![], connected);
        let (sleeper, sleeps) = recording_sleeper();
        let connector = RetriableConnector::new(stub).sleeper(sleeper);

        assert_eq!(connector.get_connection_pool(&config()).await.unwrap(), "handle");
        assert_eq!(connector.connector().calls(), 1);
        assert!(sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits_for_interval() {
        let stub = StubConnector::new(vec![retriable()], connected);
        let connector = RetriableConnector::new(stub).retry_interval(Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        connector.get_connection_pool(&config()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
