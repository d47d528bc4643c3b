//! Retry policy for activities and child workflows.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff/retry configuration attached to scheduled work.
///
/// Intervals are whole seconds on the wire, so sub-second precision is a
/// configuration error rather than something to silently round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub interval: Option<Duration>,
    /// Multiplier applied to the delay after each attempt
    pub backoff: Option<f64>,
    /// Upper bound on the delay between attempts
    pub max_interval: Option<Duration>,
    /// Maximum number of attempts, including the first
    pub max_attempts: Option<u32>,
    /// Total time allowed for all attempts
    pub expiration_interval: Option<Duration>,
    /// Error types that are never retried
    pub non_retriable_errors: Vec<String>,
}

impl RetryPolicy {
    pub fn new(interval: Duration, backoff: f64) -> Self {
        Self {
            interval: Some(interval),
            backoff: Some(backoff),
            ..Self::default()
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_expiration_interval(mut self, expiration_interval: Duration) -> Self {
        self.expiration_interval = Some(expiration_interval);
        self
    }

    pub fn with_non_retriable_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retriable_errors = errors.into_iter().map(Into::into).collect();
        self
    }

    /// Check the policy's invariants, reporting the first one violated
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.interval.is_none() || self.backoff.is_none() {
            return Err(invalid("interval and backoff must be set"));
        }

        if self.max_attempts.is_none() && self.expiration_interval.is_none() {
            return Err(invalid("max_attempts or expiration_interval must be set"));
        }

        let intervals = [self.interval, self.max_interval, self.expiration_interval];
        let whole_positive_seconds = intervals
            .iter()
            .flatten()
            .all(|d| d.subsec_nanos() == 0 && d.as_secs() > 0);
        if !whole_positive_seconds {
            return Err(invalid("All intervals must be specified in whole seconds"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ClientError {
    ClientError::InvalidRetryPolicy(message.to_string())
}
