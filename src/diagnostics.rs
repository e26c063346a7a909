//! Post-hoc failure diagnostics.
//!
//! On a fatal abort the run captures one page screenshot plus a structured
//! JSON record next to it under `{state_dir}/diagnostics/`. Strictly
//! best-effort: a diagnostics problem is logged and swallowed so it can
//! never mask the failure that triggered it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::core::{HarvestConfig, HarvestError};

/// Companion record written next to the screenshot.
#[derive(Debug, Serialize)]
pub struct FailureRecord {
    pub stage: String,
    pub error: String,
    pub error_kind: &'static str,
    pub url: String,
    pub captured_at: String,
}

/// Capture a screenshot and a failure record for `stage`.
///
/// Returns the screenshot path when that capture succeeded; the JSON record
/// is attempted either way.
pub async fn capture_failure(
    driver: &dyn PageDriver,
    cfg: &HarvestConfig,
    stage: &str,
    error: &HarvestError,
) -> Option<PathBuf> {
    let dir = cfg.diagnostics_dir();
    let ts = chrono::Utc::now().timestamp_millis();

    let record = FailureRecord {
        stage: stage.to_string(),
        error: error.to_string(),
        error_kind: error.kind(),
        url: driver.current_url().await.unwrap_or_default(),
        captured_at: chrono::Utc::now().to_rfc3339(),
    };

    let shot = dir.join(format!("failure_{stage}_{ts}.png"));
    let captured = match driver.screenshot(&shot).await {
        Ok(()) => {
            info!("📸 failure screenshot: {}", shot.display());
            Some(shot)
        }
        Err(e) => {
            warn!("failure screenshot failed: {e}");
            None
        }
    };

    let record_path = dir.join(format!("failure_{stage}_{ts}.json"));
    if let Err(e) = write_record(&record_path, &record) {
        warn!("failure record write failed: {e}");
    }
    captured
}

fn write_record(path: &Path, record: &FailureRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
    std::fs::write(path, body)
}
