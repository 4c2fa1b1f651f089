//! Retry state machine

use crate::ErrorKind;

/// Result of one connection attempt, as seen by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The attempt produced a handle
    Connected,
    /// The attempt failed with an error of this kind
    Failed(ErrorKind),
}

impl Outcome {
    /// Classify an attempt's result
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Connected,
            Err(err) => Self::Failed(err.kind()),
        }
    }
}

/// Retry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Making attempt number `n` (starting at 1)
    Attempting(u32),

    /// Connected (terminal)
    Done,

    /// Gave up (terminal)
    Failed,
}

impl RetryState {
    /// Initial state
    pub fn start() -> Self {
        Self::Attempting(1)
    }

    /// Whether no further attempts will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Next state after an attempt finished with `outcome`.
    ///
    /// A retriable failure on attempt `n` leads to `Attempting(n + 1)` while
    /// `n < max_retries`; the caller sleeps before making that attempt.
    /// Terminal states are absorbing.
    pub fn next(self, outcome: Outcome, max_retries: u32) -> Self {
        match (self, outcome) {
            (Self::Attempting(_), Outcome::Connected) => Self::Done,
            (Self::Attempting(n), Outcome::Failed(ErrorKind::Retriable)) if n < max_retries => {
                Self::Attempting(n + 1)
            }
            (Self::Attempting(_), Outcome::Failed(_)) => Self::Failed,
            (terminal, _) => terminal,
        }
    }
}

impl std::fmt::Display for RetryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attempting(n) => write!(f, "attempting({})", n),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
