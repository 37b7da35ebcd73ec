//! Fixed-interval readiness polling.
//!
//! A readiness predicate is polled until it reports `true` or the polling
//! budget is spent. The budget is `round(timeout / interval)` invocations,
//! never fewer than one, so a wait with an immediately-true predicate costs
//! exactly one call and a wait that never succeeds costs exactly the budget.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::ProvisionError;

/// Number of predicate invocations a wait is allowed.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn poll_budget(interval: Duration, timeout: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let ratio = (timeout.as_secs_f64() / interval.as_secs_f64()).round();
    (ratio.min(f64::from(u32::MAX)) as u32).max(1)
}

/// Poll `predicate` every `interval` until it holds or `timeout` elapses.
///
/// Transient errors from the predicate count as "not ready yet"; any other
/// error aborts the wait. Returns the number of invocations on success.
///
/// # Errors
///
/// Returns `Timeout` if the budget is spent, or the predicate's fatal error.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    mut predicate: F,
) -> Result<u32, ProvisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ProvisionError>>,
{
    let budget = poll_budget(interval, timeout);

    for attempt in 1..=budget {
        match predicate().await {
            Ok(true) => {
                debug!(what = %what, attempt, "Ready");
                return Ok(attempt);
            }
            Ok(false) => {
                debug!(what = %what, attempt, budget, "Not ready yet");
            }
            Err(e) if e.is_transient() => {
                debug!(what = %what, attempt, error = %e, "Readiness check failed transiently");
            }
            Err(e) => return Err(e),
        }

        if attempt < budget {
            tokio::time::sleep(interval).await;
        }
    }

    Err(ProvisionError::timeout(what, timeout))
}
