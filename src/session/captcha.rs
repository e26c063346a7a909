//! Challenge checkpoint strategies.
//!
//! When a verification challenge interrupts login, the run suspends and one
//! of three strategies owns the checkpoint until the marker clears or the
//! budget runs out:
//!
//! - **manual**: keep the window open and poll until a human solves it.
//! - **slider**: attempt the drag puzzle a few times, then hand the rest of
//!   the budget to the manual path.
//! - **off**: one grace poll, then give up immediately (headless CI).
//!
//! A strategy never fails the run by itself. It reports [`SolveOutcome`] and
//! the session layer decides what that means.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::distr::{Distribution, Uniform};
use tracing::{debug, info, warn};

use crate::browser::{wait_until, ElementHandle, PageDriver};
use crate::core::{CaptchaMode, HarvestError};
use crate::locator::{self, site};

/// Marker polling cadence shared by every strategy.
const POLL: Duration = Duration::from_millis(250);
const MAX_DRAG_ATTEMPTS: u32 = 3;
/// Drag distance when track geometry cannot be measured.
const FALLBACK_TRAVEL_PX: f64 = 260.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    Cleared,
    StillPresent,
}

#[async_trait]
pub trait CaptchaStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drive the checkpoint until cleared or `budget` is spent.
    async fn solve(&self, driver: &dyn PageDriver, budget: Duration) -> SolveOutcome;
}

pub fn strategy_for(mode: CaptchaMode) -> Box<dyn CaptchaStrategy> {
    match mode {
        CaptchaMode::Manual => Box::new(ManualStrategy),
        CaptchaMode::Slider => Box::new(SliderStrategy),
        CaptchaMode::Off => Box::new(OffStrategy),
    }
}

/// The checkpoint counts as cleared only when no challenge marker resolves.
pub(crate) async fn challenge_present(driver: &dyn PageDriver) -> bool {
    locator::resolve(driver, &site::CAPTCHA_MARKER).await.is_some()
}

/// Wait for a human. The browser window stays open and interactive; we only
/// watch for the challenge container to leave the DOM.
pub struct ManualStrategy;

#[async_trait]
impl CaptchaStrategy for ManualStrategy {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn solve(&self, driver: &dyn PageDriver, budget: Duration) -> SolveOutcome {
        info!(
            "🧩 verification challenge detected — solve it in the browser window ({}s budget)",
            budget.as_secs()
        );
        let cleared = wait_until(POLL, budget, || async move {
            if challenge_present(driver).await {
                None
            } else {
                Some(())
            }
        })
        .await;

        match cleared {
            Some(()) => {
                info!("✅ challenge cleared");
                SolveOutcome::Cleared
            }
            None => {
                warn!("⚠️ challenge still present after {}s", budget.as_secs());
                SolveOutcome::StillPresent
            }
        }
    }
}

/// Best-effort drag on slider puzzles, with the manual path as a fallback
/// for whatever budget remains after the attempts.
pub struct SliderStrategy;

#[async_trait]
impl CaptchaStrategy for SliderStrategy {
    fn name(&self) -> &'static str {
        "slider"
    }

    async fn solve(&self, driver: &dyn PageDriver, budget: Duration) -> SolveOutcome {
        let started = Instant::now();

        for attempt in 1..=MAX_DRAG_ATTEMPTS {
            if started.elapsed() >= budget {
                warn!("⚠️ challenge budget spent mid-drag");
                return SolveOutcome::StillPresent;
            }
            if !challenge_present(driver).await {
                info!("✅ challenge cleared");
                return SolveOutcome::Cleared;
            }

            let Some(handle) = locator::resolve(driver, &site::SLIDER_HANDLE).await else {
                debug!("no slider handle on this challenge, leaving it to a human");
                break;
            };

            info!("🎚️ slider attempt {attempt}/{MAX_DRAG_ATTEMPTS}");
            if let Err(e) = drag_slider(driver, handle.handle).await {
                warn!("slider drag failed: {e}");
                break;
            }
            tokio::time::sleep(Duration::from_millis(600)).await;

            if !challenge_present(driver).await {
                info!("✅ challenge cleared after drag");
                return SolveOutcome::Cleared;
            }
            warn!("slider attempt {attempt} did not clear the challenge");
        }

        let remaining = budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return SolveOutcome::StillPresent;
        }
        info!("🧩 falling back to manual solve for the remaining {}s", remaining.as_secs());
        ManualStrategy.solve(driver, remaining).await
    }
}

/// One complete drag: press on the handle, ease along a jittered path,
/// release near the end of the track.
async fn drag_slider(driver: &dyn PageDriver, handle: ElementHandle) -> Result<(), HarvestError> {
    let (sx, sy) = driver.clickable_point(handle).await?;

    // Track center gives the travel distance; the handle starts at the left
    // edge, so the full sweep is twice the center offset.
    let travel = match locator::resolve(driver, &site::SLIDER_TRACK).await {
        Some(track) => {
            let (tx, _) = driver.clickable_point(track.handle).await?;
            let sweep = 2.0 * (tx - sx);
            if sweep > 40.0 {
                sweep
            } else {
                FALLBACK_TRAVEL_PX
            }
        }
        None => FALLBACK_TRAVEL_PX,
    };

    // rand's Rng is not Send, so the whole plan is sampled up front and the
    // awaits only replay it.
    let plan: Vec<(f64, f64, u64)> = {
        let mut rng = rand::rng();
        let steps = Uniform::new(14usize, 26).unwrap().sample(&mut rng);
        let overshoot = Uniform::new(-6.0f64, 6.0).unwrap().sample(&mut rng);
        let wobble = Uniform::new(-1.5f64, 1.5).unwrap();
        let pause = Uniform::new(10u64, 28).unwrap();
        (0..steps)
            .map(|i| {
                let t = (i + 1) as f64 / steps as f64;
                // Quadratic ease-out: fast start, slow landing.
                let eased = 1.0 - (1.0 - t) * (1.0 - t);
                (
                    sx + (travel + overshoot) * eased,
                    sy + wobble.sample(&mut rng),
                    pause.sample(&mut rng),
                )
            })
            .collect()
    };

    driver.press_mouse(sx, sy).await?;
    let mut end = (sx, sy);
    for (x, y, pause_ms) in plan {
        driver.move_mouse(&[(x, y)]).await?;
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        end = (x, y);
    }
    driver.release_mouse(end.0, end.1).await?;
    Ok(())
}

/// No human available and no drag worth trying: one grace poll, then report
/// the challenge as unsolved so the run can fail fast.
pub struct OffStrategy;

#[async_trait]
impl CaptchaStrategy for OffStrategy {
    fn name(&self) -> &'static str {
        "off"
    }

    async fn solve(&self, driver: &dyn PageDriver, _budget: Duration) -> SolveOutcome {
        tokio::time::sleep(POLL).await;
        if challenge_present(driver).await {
            warn!("⚠️ challenge present and no solver configured");
            SolveOutcome::StillPresent
        } else {
            info!("✅ challenge cleared on its own");
            SolveOutcome::Cleared
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ScriptedDriver, ScriptedElement};

    fn marker() -> ScriptedElement {
        ScriptedElement::new([site::CAPTCHA_MARKER.candidates()[0]])
    }

    #[tokio::test]
    async fn manual_clears_once_the_marker_vanishes() {
        let d = ScriptedDriver::new();
        d.install(vec![marker()]).await;
        // Marker answers two polls, then the "human" has solved it.
        d.vanish_after(site::CAPTCHA_MARKER.candidates()[0], 2).await;

        let got = ManualStrategy.solve(&d, Duration::from_secs(5)).await;
        assert_eq!(got, SolveOutcome::Cleared);
    }

    #[tokio::test]
    async fn manual_gives_up_at_the_deadline() {
        let d = ScriptedDriver::new();
        d.install(vec![marker()]).await;

        let started = Instant::now();
        let got = ManualStrategy.solve(&d, Duration::from_millis(300)).await;
        assert_eq!(got, SolveOutcome::StillPresent);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn slider_drags_and_observes_the_clear() {
        let d = ScriptedDriver::new();
        d.install(vec![
            marker(),
            ScriptedElement::new([site::SLIDER_HANDLE.candidates()[0]]),
            ScriptedElement::new([site::SLIDER_TRACK.candidates()[0]]),
        ])
        .await;
        // One pre-drag poll answers, the post-drag poll sees it gone.
        d.vanish_after(site::CAPTCHA_MARKER.candidates()[0], 1).await;

        let got = SliderStrategy.solve(&d, Duration::from_secs(10)).await;
        assert_eq!(got, SolveOutcome::Cleared);

        let calls = d.calls().await;
        assert!(calls.iter().any(|c| c == "press_mouse"));
        assert!(calls.iter().any(|c| c.starts_with("move_mouse:")));
        assert!(calls.iter().any(|c| c == "release_mouse"));
    }

    #[tokio::test]
    async fn slider_without_a_handle_leaves_it_to_a_human() {
        let d = ScriptedDriver::new();
        d.install(vec![marker()]).await;

        let got = SliderStrategy.solve(&d, Duration::from_millis(300)).await;
        assert_eq!(got, SolveOutcome::StillPresent);

        let calls = d.calls().await;
        assert!(!calls.iter().any(|c| c == "press_mouse"));
    }

    #[tokio::test]
    async fn off_mode_fails_fast() {
        let d = ScriptedDriver::new();
        d.install(vec![marker()]).await;

        let started = Instant::now();
        let got = OffStrategy.solve(&d, Duration::from_secs(60)).await;
        assert_eq!(got, SolveOutcome::StillPresent);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn off_mode_accepts_a_marker_that_cleared_in_the_grace_poll() {
        let d = ScriptedDriver::new();
        d.install(vec![marker()]).await;
        d.vanish_after(site::CAPTCHA_MARKER.candidates()[0], 0).await;

        let got = OffStrategy.solve(&d, Duration::from_secs(60)).await;
        assert_eq!(got, SolveOutcome::Cleared);
    }

    #[test]
    fn every_mode_maps_to_a_strategy() {
        assert_eq!(strategy_for(CaptchaMode::Manual).name(), "manual");
        assert_eq!(strategy_for(CaptchaMode::Slider).name(), "slider");
        assert_eq!(strategy_for(CaptchaMode::Off).name(), "off");
    }
}
