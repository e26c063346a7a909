//! Run orchestration: one browser, one session, one pagination loop.
//!
//! [`run`] owns the browser lifecycle and always releases it, whatever the
//! outcome. The driver-facing pipeline lives in [`drive_harvest`], which is
//! generic over [`PageDriver`] so the whole flow runs against the scripted
//! driver in tests.
//!
//! Failure policy: any fatal error after launch is folded into the returned
//! [`RunReport`] together with whatever was harvested before it — partial
//! data is returned, never discarded. `Err` from [`run`] itself means the
//! browser could not even be launched.

use std::time::Duration;

use tracing::{info, warn};

use crate::browser::{wait_until, BrowserSession, PageDriver, WaitPolicy};
use crate::core::{HarvestConfig, HarvestError, RunOutcome, RunReport};
use crate::diagnostics;
use crate::harvest::Accumulator;
use crate::locator::{self, site};
use crate::pagination::{PaginationController, StopReason};
use crate::persist;
use crate::session::{dismiss_popups, SessionEstablisher};

const POLL: Duration = Duration::from_millis(250);

/// Execute a full harvest run against a real browser.
pub async fn run(cfg: &HarvestConfig) -> Result<RunReport, HarvestError> {
    info!("🚀 harvesting the {} list of @{}", cfg.list, cfg.target);

    let mut session = BrowserSession::launch(cfg.headful, cfg.stealth)
        .await
        .map_err(|e| HarvestError::Browser(e.to_string()))?;
    let driver = session.driver(cfg.nav_timeout);

    let report = drive_harvest(cfg, &driver).await;

    session.close().await;
    Ok(report)
}

/// The driver-facing pipeline: establish a session, open the roster surface,
/// paginate, persist. Never returns `Err` — failures become the report's
/// outcome so partial records survive.
pub async fn drive_harvest(cfg: &HarvestConfig, driver: &dyn PageDriver) -> RunReport {
    let mut acc = Accumulator::new();

    let mut establisher = SessionEstablisher::new(cfg);
    if let Err(e) = establisher.establish(driver).await {
        return fail(driver, cfg, "session", e, acc, 0).await;
    }

    if let Err(e) = open_roster(cfg, driver).await {
        return fail(driver, cfg, "roster", e, acc, 0).await;
    }

    let controller = PaginationController::from_config(cfg);
    let (stop, state) = controller.run(driver, &cfg.base_url, &mut acc).await;
    let outcome = match stop {
        StopReason::EndOfList => RunOutcome::EndOfList,
        StopReason::BudgetExhausted => RunOutcome::BudgetExhausted,
    };

    let records = acc.into_records();
    match persist::write_records(&cfg.output, &records) {
        Ok(()) => RunReport {
            outcome,
            records,
            rounds: state.rounds_elapsed,
            output: Some(cfg.output.clone()),
        },
        Err(e) => {
            diagnostics::capture_failure(driver, cfg, "persist", &e).await;
            RunReport {
                outcome: RunOutcome::Failed(e),
                records,
                rounds: state.rounds_elapsed,
                output: None,
            }
        }
    }
}

async fn fail(
    driver: &dyn PageDriver,
    cfg: &HarvestConfig,
    stage: &str,
    error: HarvestError,
    acc: Accumulator,
    rounds: usize,
) -> RunReport {
    warn!("❌ {stage} failed: {error}");
    diagnostics::capture_failure(driver, cfg, stage, &error).await;
    RunReport {
        outcome: RunOutcome::Failed(error),
        records: acc.into_records(),
        rounds,
        output: None,
    }
}

/// Surface the roster panel. Direct URL navigation is the primary path; the
/// profile count control is only clicked when the panel does not come up.
async fn open_roster(cfg: &HarvestConfig, driver: &dyn PageDriver) -> Result<(), HarvestError> {
    driver
        .navigate(&cfg.roster_url(), WaitPolicy::NetworkSettled)
        .await?;
    dismiss_popups(driver).await;

    if locator::resolve(driver, &site::RECORD_CONTAINER).await.is_some() {
        return Ok(());
    }

    info!("🔄 roster panel absent after direct navigation — trying the count control");
    driver
        .navigate(&cfg.profile_url(), WaitPolicy::NetworkSettled)
        .await?;
    let control = locator::resolve(driver, &site::count_control(cfg.list))
        .await
        .ok_or(HarvestError::LocatorUnresolved {
            what: "roster count control",
        })?;
    driver.click(control.handle).await?;

    let surfaced = wait_until(POLL, cfg.nav_timeout, || async move {
        locator::resolve(driver, &site::RECORD_CONTAINER)
            .await
            .map(|_| ())
    })
    .await;
    surfaced.ok_or(HarvestError::NavigationTimeout {
        what: "roster panel",
    })
}
