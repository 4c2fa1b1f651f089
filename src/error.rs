//! Error types
//!
//! Every error carries an [`ErrorKind`]. Only network-level failures observed
//! while pinging a freshly opened pool are [`ErrorKind::Retriable`]; the retry
//! loop compares kinds and never inspects the underlying driver error.

use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration (bad timeout, unsupported type,
    /// unreadable CA file, TLS registration failure)
    #[error("{0}")]
    Config(String),

    /// Connection string could not be parsed or serialized
    #[error("{0}")]
    ConnectionString(String),

    /// Peer certificate could not be parsed or did not chain to a trusted root
    #[error("{0}")]
    Verification(String),

    /// Transient network failure, eligible for retry
    #[error("{msg}: {source}")]
    Retriable {
        /// Which step failed
        msg: &'static str,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// Any other driver failure (auth rejected, unknown database, bad query)
    #[error("{msg}: {source}")]
    Database {
        /// Which step failed
        msg: &'static str,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },
}

/// Retry classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Try again after the retry interval
    Retriable,
    /// Give up immediately
    Fatal,
}

impl Error {
    /// Classify this error for the retry loop.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Retriable { .. } => ErrorKind::Retriable,
            Error::Config(_)
            | Error::ConnectionString(_)
            | Error::Verification(_)
            | Error::Database { .. } => ErrorKind::Fatal,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::Retriable`.
    pub fn is_retriable(&self) -> bool {
        self.kind() == ErrorKind::Retriable
    }

    /// Prefix the message of a string-carrying error with `prefix`,
    /// keeping its variant (and therefore its kind).
    ///
    /// Driver errors already carry a static step description and are
    /// returned unchanged.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Error::Config(msg) => Error::Config(format!("{}: {}", prefix, msg)),
            Error::ConnectionString(msg) => {
                Error::ConnectionString(format!("{}: {}", prefix, msg))
            }
            Error::Verification(msg) => Error::Verification(format!("{}: {}", prefix, msg)),
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }

    #[test]
    fn test_only_retriable_variant_is_retriable() {
        let retriable = Error::Retriable {
            msg: "unable to ping",
            source: io_error(),
        };
        assert_eq!(retriable.kind(), ErrorKind::Retriable);
        assert!(retriable.is_retriable());

        let fatal = [
            Error::Config("bad".into()),
            Error::ConnectionString("bad".into()),
            Error::Verification("bad".into()),
            Error::Database {
                msg: "unable to ping",
                source: io_error(),
            },
        ];
        for err in fatal {
            assert_eq!(err.kind(), ErrorKind::Fatal, "{err}");
        }
    }

    #[test]
    fn test_driver_errors_chain_the_cause() {
        let err = Error::Retriable {
            msg: "unable to ping",
            source: io_error(),
        };
        let message = err.to_string();
        assert!(message.starts_with("unable to ping: "));
        assert!(message.contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_context_keeps_variant() {
        let err = Error::ConnectionString("parsing db connection string: foxtrot".into())
            .context("failed to create connection string");
        assert!(matches!(err, Error::ConnectionString(_)));
        assert_eq!(
            err.to_string(),
            "failed to create connection string: parsing db connection string: foxtrot"
        );
    }

    #[test]
    fn test_context_leaves_driver_errors_alone() {
        let err = Error::Database {
            msg: "unable to ping",
            source: io_error(),
        }
        .context("ignored");
        assert!(err.to_string().starts_with("unable to ping: "));
    }
}
