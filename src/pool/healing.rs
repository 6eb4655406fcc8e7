use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bb8::ErrorSink;
use tracing::{error, warn};

use crate::error::PgSteadyError;

/// Per-operation budget of consecutive connection losses.
///
/// Each pool operation owns one, so concurrent callers never share a counter.
#[derive(Debug)]
pub(crate) struct HealBudget {
    failures: u32,
    max: u32,
    backoff: Duration,
}

impl HealBudget {
    pub(crate) fn new(max: u32, backoff: Duration) -> Self {
        Self {
            failures: 0,
            max,
            backoff,
        }
    }

    /// Record a lost connection. `Ok` means heal and retry, `Err` hands the failure back.
    pub(crate) fn record(&mut self, err: PgSteadyError) -> Result<(), PgSteadyError> {
        if self.failures >= self.max {
            error!(error = %err, attempts = self.failures, "DB connection was lost - unable to reconnect");
            self.failures = 0;
            return Err(err);
        }
        self.failures += 1;
        warn!(
            error = %err,
            attempt = self.failures,
            max = self.max,
            "DB connection was lost - reconnecting and retrying"
        );
        Ok(())
    }

    pub(crate) fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Keeps the latest failed `connect`.
///
/// bb8 reports a failed connect to the waiting caller only as a checkout timeout, so
/// the pool looks here to tell an unreachable server from contention.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectErrors {
    last: Arc<Mutex<Option<PgSteadyError>>>,
}

impl ConnectErrors {
    pub(crate) fn take(&self) -> Option<PgSteadyError> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn clear(&self) {
        drop(self.take());
    }
}

impl ErrorSink<PgSteadyError> for ConnectErrors {
    fn sink(&self, err: PgSteadyError) {
        warn!(error = %err, "failed to open DB connection");
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<PgSteadyError>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gives_up_after_max_failures() {
        let mut budget = HealBudget::new(3, Duration::ZERO);
        for _ in 0..3 {
            assert!(budget.record(PgSteadyError::connection_lost("gone")).is_ok());
        }
        let err = budget
            .record(PgSteadyError::connection_lost("gone"))
            .unwrap_err();
        assert!(err.is_connection_lost());
        // counter resets once the failure is surfaced
        assert!(budget.record(PgSteadyError::connection_lost("gone")).is_ok());
    }

    #[test]
    fn connect_errors_keep_only_the_latest() {
        let errors = ConnectErrors::default();
        assert!(errors.take().is_none());

        errors.sink(PgSteadyError::syntax_error("first"));
        errors.boxed_clone().sink(PgSteadyError::connection_lost("refused"));

        let err = errors.take().unwrap();
        assert!(err.is_connection_lost());
        assert!(errors.take().is_none());
    }
}
