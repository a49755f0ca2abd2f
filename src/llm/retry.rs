use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::error::{AnalysisError, Result};

/// Runs `op` up to `max_attempts` times with exponential backoff, retrying
/// only transient failures. Schema and document faults surface immediately.
///
/// Keeping retry policy in one combinator keeps the failure handling of each
/// stage visible and testable apart from its business logic.
pub async fn with_retries<T, F, Fut>(
    label: &str,
    max_attempts: usize,
    backoff_base: Duration,
    op: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(max_attempts >= 1);
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                last_reason = err.to_string();
                let delay = backoff_base * 2u32.saturating_pow(attempt as u32 - 1);
                warn!(
                    "{}: transient failure on attempt {}/{} ({}), retrying in {:?}",
                    label, attempt, max_attempts, last_reason, delay
                );
                sleep(delay).await;
            }
            Err(err) if err.is_transient() => {
                return Err(AnalysisError::LlmUnavailable {
                    attempts: max_attempts,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Err(AnalysisError::LlmUnavailable {
        attempts: max_attempts,
        reason: last_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> AnalysisError {
        AnalysisError::LlmUnavailable {
            attempts: 1,
            reason: "connection reset".to_string(),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retries("test", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_attempts() {
        let result: Result<()> = with_retries("test", 3, Duration::from_millis(1), || async {
            Err(transient())
        })
        .await;

        match result.unwrap_err() {
            AnalysisError::LlmUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn parse_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_retries("test", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AnalysisError::LlmParseError("bad json".to_string())) }
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            AnalysisError::LlmParseError(_)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
