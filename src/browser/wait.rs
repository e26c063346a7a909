//! Suspend-until-predicate-or-timeout.
//!
//! One polling primitive shared by every cooperative wait in the crate: the
//! CAPTCHA clearance loop, the post-submit settle race, and the pagination
//! stall re-check all express themselves as an async probe returning
//! `Some(value)` when the condition holds.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Poll `probe` every `interval` until it yields `Some`, or give up after
/// `timeout` and return `None`.
///
/// The probe always runs at least once, immediately; the timeout check
/// happens after each probe so a condition that is already true never
/// reports a timeout, regardless of budget.
pub async fn wait_until<T, F, Fut>(interval: Duration, timeout: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(v) = probe().await {
            return Some(v);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return None;
        }
        // Never sleep past the deadline.
        sleep(interval.min(timeout - elapsed)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn already_true_condition_returns_immediately() {
        let got = wait_until(Duration::from_millis(50), Duration::ZERO, || async {
            Some(7)
        })
        .await;
        assert_eq!(got, Some(7));
    }

    #[tokio::test]
    async fn condition_becoming_true_is_observed() {
        let polls = AtomicU32::new(0);
        let got = wait_until(Duration::from_millis(5), Duration::from_millis(500), || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 2).then_some("cleared") }
        })
        .await;
        assert_eq!(got, Some("cleared"));
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_none() {
        let started = std::time::Instant::now();
        let got: Option<()> = wait_until(
            Duration::from_millis(10),
            Duration::from_millis(60),
            || async { None },
        )
        .await;
        assert_eq!(got, None);
        assert!(started.elapsed() >= Duration::from_millis(60));
        // The final sleep is clamped to the deadline, so no gross overshoot.
        assert!(started.elapsed() < Duration::from_millis(300));
    }
}
