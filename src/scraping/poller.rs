//! Wait-until-ready polling.
//!
//! Profile pages render asynchronously and expose no "done" signal, so every
//! wait in a sync cycle is a fixed-interval poll of a predicate. One primitive
//! covers both shapes the cycle needs:
//!
//! * [`WaitBudget::Unbounded`]: poll until the predicate yields (or the cycle
//!   is cancelled). Used while the contact-info overlay loads.
//! * [`WaitBudget::Bounded`]: the remaining budget shrinks by one interval per
//!   failed check; exhaustion is a [`WaitError::TimedOut`]. Used to discover the
//!   action-button container.
//!
//! The poller sleeps on the tokio timer between checks and never spins.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::DEFAULT_POLL_INTERVAL_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBudget {
    Unbounded,
    Bounded(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("gave up after {}ms", budget.as_millis())]
    TimedOut { budget: Duration },
    #[error("wait cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub interval: Duration,
    pub budget: WaitBudget,
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::unbounded(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl WaitOptions {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            budget: WaitBudget::Unbounded,
            cancel: None,
        }
    }

    pub fn bounded(interval: Duration, budget: Duration) -> Self {
        Self {
            interval,
            budget: WaitBudget::Bounded(budget),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Evaluate `predicate` now and then once per `options.interval` until it
/// yields `Some`. The predicate is never evaluated again after it yields.
pub async fn wait_until<T, F, Fut>(mut predicate: F, options: &WaitOptions) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut remaining = match options.budget {
        WaitBudget::Unbounded => None,
        WaitBudget::Bounded(budget) => Some(budget),
    };
    let mut checks: u64 = 0;

    loop {
        if is_cancelled(options.cancel.as_ref()) {
            return Err(WaitError::Cancelled);
        }

        checks += 1;
        if let Some(value) = predicate().await {
            debug!("wait_until: ready after {} checks", checks);
            return Ok(value);
        }

        if let Some(left) = remaining.as_mut() {
            if left.is_zero() {
                let budget = match options.budget {
                    WaitBudget::Bounded(b) => b,
                    WaitBudget::Unbounded => Duration::ZERO,
                };
                debug!("wait_until: budget exhausted after {} checks", checks);
                return Err(WaitError::TimedOut { budget });
            }
            *left = left.saturating_sub(options.interval);
        }

        pause(options.interval, options.cancel.as_ref()).await?;
    }
}

/// Sleep for `duration`, returning early with [`WaitError::Cancelled`] if the
/// token fires first.
pub async fn pause(duration: Duration, cancel: Option<&CancellationToken>) -> Result<(), WaitError> {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        },
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    const TICK: Duration = Duration::from_millis(50);

    fn counting(ready_at: usize) -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<Option<usize>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let predicate = move || {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready((n >= ready_at).then_some(n))
        };
        (calls, predicate)
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_with_first_value_and_stops_checking() {
        let (calls, predicate) = counting(4);
        let started = Instant::now();

        let value = wait_until(predicate, &WaitOptions::unbounded(TICK)).await.unwrap();

        assert_eq!(value, 4);
        assert_eq!(started.elapsed(), TICK * 3);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_value_needs_no_sleep() {
        let started = Instant::now();
        let value = wait_until(|| async { Some("ready") }, &WaitOptions::bounded(TICK, Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(value, "ready");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_times_out_within_one_interval_of_budget() {
        for budget_ms in [0u64, 100, 120, 10_000] {
            let budget = Duration::from_millis(budget_ms);
            let started = Instant::now();

            let err = wait_until(|| async { None::<()> }, &WaitOptions::bounded(TICK, budget))
                .await
                .unwrap_err();

            assert_eq!(err, WaitError::TimedOut { budget });
            assert!(
                started.elapsed() <= budget + TICK,
                "budget {budget_ms}ms took {:?}",
                started.elapsed()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_succeeds_inside_budget() {
        let (_, predicate) = counting(10);
        let value = wait_until(predicate, &WaitOptions::bounded(TICK, Duration::from_millis(1_000)))
            .await
            .unwrap();
        assert_eq!(value, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_wait_outlasts_any_budget() {
        let (_, predicate) = counting(1_000);
        let started = Instant::now();
        let value = wait_until(predicate, &WaitOptions::unbounded(TICK)).await.unwrap();
        assert_eq!(value, 1_000);
        assert!(started.elapsed() > Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_sleep() {
        let token = CancellationToken::new();
        let options = WaitOptions::unbounded(TICK).with_cancel(token.clone());
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = wait_until(|| async { None::<()> }, &options).await.unwrap_err();

        assert_eq!(err, WaitError::Cancelled);
        assert_eq!(started.elapsed(), Duration::from_millis(120));
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_predicate() {
        let token = CancellationToken::new();
        token.cancel();
        let (calls, predicate) = counting(1);
        let err = wait_until(predicate, &WaitOptions::default().with_cancel(token))
            .await
            .unwrap_err();
        assert_eq!(err, WaitError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
