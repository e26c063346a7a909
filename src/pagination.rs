//! Scroll-driven pagination with height-based stagnation detection.
//!
//! Virtualized infinite lists expose no item count, so document height is
//! the only termination signal available. A single unchanged measurement
//! proves nothing (one slow render frame looks identical), which is why the
//! controller requires a *consecutive* run of stagnant rounds, and even then
//! grants one elongated wait before declaring end-of-list.
//!
//! Round shape: scroll to bottom → settle → measure and decide → extract →
//! count the round. The round budget is a soft limit — hitting it returns
//! everything harvested so far.

use std::time::Duration;

use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::core::HarvestConfig;
use crate::harvest::{extract_pass, Accumulator};

/// Per-run scroll bookkeeping, mutated once per round.
#[derive(Debug, Default)]
pub struct ScrollState {
    pub document_height: u64,
    pub stagnation_streak: u32,
    pub rounds_elapsed: usize,
}

/// Why the loop stopped. Both variants are successful terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The list stopped growing for the configured streak of rounds.
    EndOfList,
    /// Round budget spent; the list may legitimately be longer.
    BudgetExhausted,
}

pub struct PaginationController {
    pub max_rounds: usize,
    pub settle: Duration,
    pub stagnation_threshold: u32,
}

impl PaginationController {
    pub fn new(max_rounds: usize, settle: Duration, stagnation_threshold: u32) -> Self {
        Self {
            max_rounds,
            settle,
            // A threshold of zero would terminate before the first scroll.
            stagnation_threshold: stagnation_threshold.max(1),
        }
    }

    pub fn from_config(cfg: &HarvestConfig) -> Self {
        Self::new(cfg.max_rounds, cfg.settle, cfg.stagnation_threshold)
    }

    /// Drive rounds until stagnation or budget exhaustion, feeding every
    /// round's visible records through the accumulator.
    pub async fn run(
        &self,
        driver: &dyn PageDriver,
        base_url: &str,
        acc: &mut Accumulator,
    ) -> (StopReason, ScrollState) {
        let mut state = ScrollState {
            document_height: document_height(driver).await,
            ..Default::default()
        };
        info!(
            "📜 pagination: baseline height {}, budget {} rounds",
            state.document_height, self.max_rounds
        );

        loop {
            scroll_to_bottom(driver).await;
            tokio::time::sleep(self.settle).await;

            let measured = document_height(driver).await;
            if measured > state.document_height {
                state.stagnation_streak = 0;
            } else {
                state.stagnation_streak += 1;
                debug!(
                    "stagnant round ({} consecutive, height {})",
                    state.stagnation_streak, measured
                );
                if state.stagnation_streak >= self.stagnation_threshold {
                    // One elongated wait to rule out a slow network before
                    // declaring the end of the list.
                    tokio::time::sleep(self.settle * 3).await;
                    let recheck = document_height(driver).await;
                    if recheck > state.document_height {
                        debug!("late growth after elongated wait ({recheck})");
                        state.stagnation_streak = 0;
                        state.document_height = recheck;
                    } else {
                        state.rounds_elapsed += 1;
                        info!(
                            "✅ end of list after {} rounds ({} stagnant, height {})",
                            state.rounds_elapsed, state.stagnation_streak, state.document_height
                        );
                        return (StopReason::EndOfList, state);
                    }
                }
            }
            state.document_height = state.document_height.max(measured);

            let appended = extract_pass(driver, base_url, acc).await;
            state.rounds_elapsed += 1;
            info!(
                "🔄 round {}/{}: height {}, +{} records ({} total)",
                state.rounds_elapsed,
                self.max_rounds,
                state.document_height,
                appended,
                acc.len()
            );

            if state.rounds_elapsed >= self.max_rounds {
                info!(
                    "⏹️ round budget exhausted — soft success with {} records",
                    acc.len()
                );
                return (StopReason::BudgetExhausted, state);
            }
        }
    }
}

async fn document_height(driver: &dyn PageDriver) -> u64 {
    driver
        .evaluate("document.body.scrollHeight")
        .await
        .ok()
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

async fn scroll_to_bottom(driver: &dyn PageDriver) {
    let _ = driver
        .evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await;
}
