use tracing::{error, info, warn};

use roster_scout::core::{HarvestConfig, ListKind, RunOutcome};

/// CLI overrides on top of the environment: `--list following|followers`,
/// `--output PATH`, `--headful`.
fn apply_cli_overrides(cfg: &mut HarvestConfig) {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--list" {
            if let Some(v) = args.next() {
                match v.parse::<ListKind>() {
                    Ok(kind) => cfg.list = kind,
                    Err(e) => warn!("{e} — keeping '{}'", cfg.list),
                }
            }
        } else if let Some(rest) = a.strip_prefix("--list=") {
            match rest.parse::<ListKind>() {
                Ok(kind) => cfg.list = kind,
                Err(e) => warn!("{e} — keeping '{}'", cfg.list),
            }
        } else if a == "--output" {
            if let Some(v) = args.next() {
                cfg.output = v.into();
            }
        } else if let Some(rest) = a.strip_prefix("--output=") {
            cfg.output = rest.into();
        } else if a == "--headful" {
            cfg.headful = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut cfg = match HarvestConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("❌ {e}");
            eprintln!("Set ROSTER_USERNAME, ROSTER_PASSWORD and ROSTER_TARGET, then re-run.");
            std::process::exit(2);
        }
    };
    apply_cli_overrides(&mut cfg);

    let report = roster_scout::runner::run(&cfg).await?;

    match &report.outcome {
        RunOutcome::EndOfList => info!(
            "✅ end of list: {} records in {} rounds",
            report.records.len(),
            report.rounds
        ),
        RunOutcome::BudgetExhausted => info!(
            "✅ round budget exhausted: {} records in {} rounds (the list may be longer)",
            report.records.len(),
            report.rounds
        ),
        RunOutcome::Failed(e) => {
            error!("❌ run failed: {e}");
            if !report.records.is_empty() {
                warn!(
                    "{} records were harvested before the failure but not persisted",
                    report.records.len()
                );
            }
            std::process::exit(1);
        }
    }
    if let Some(path) = &report.output {
        info!("💾 output: {}", path.display());
    }
    Ok(())
}
