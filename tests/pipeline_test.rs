//! Offline end-to-end pipeline tests over the scripted driver: login,
//! checkpoint, roster navigation, pagination, extraction and persistence,
//! without a real browser.

use std::path::Path;
use std::time::Duration;

use roster_scout::browser::{Effect, ScriptedDriver, ScriptedElement};
use roster_scout::core::{CaptchaMode, HarvestConfig, HarvestError, ListKind, RunOutcome};
use roster_scout::runner::drive_harvest;

const USERNAME_SEL: &str = "input[name='username']";
const PASSWORD_SEL: &str = "input[type='password']";
const SUBMIT_SEL: &str = "button[data-e2e='login-button']";
const CAPTCHA_SEL: &str = "div.captcha_verify_container";
const ROW_SEL: &str = "div[data-e2e='follow-item']";

// Initialize logging for tests
fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn test_cfg(dir: &Path) -> HarvestConfig {
    HarvestConfig {
        username: "operator@example.com".into(),
        password: "hunter2".into(),
        target: "somebody".into(),
        list: ListKind::Following,
        base_url: "https://www.tiktok.com".into(),
        output: dir.join("roster.json"),
        max_rounds: 10,
        settle: Duration::from_millis(2),
        stagnation_threshold: 3,
        captcha_timeout: Duration::from_millis(300),
        nav_timeout: Duration::from_millis(500),
        captcha_mode: CaptchaMode::Manual,
        headful: true,
        stealth: false,
        reuse_session: false,
        state_dir: dir.to_path_buf(),
    }
}

fn login_form() -> Vec<ScriptedElement> {
    vec![
        ScriptedElement::new([USERNAME_SEL]),
        ScriptedElement::new([PASSWORD_SEL]),
        ScriptedElement::new([SUBMIT_SEL]),
    ]
}

fn remove_form() -> Effect {
    Effect::Remove(vec![
        USERNAME_SEL.into(),
        PASSWORD_SEL.into(),
        SUBMIT_SEL.into(),
    ])
}

fn roster_row(handle: &str, name: &str) -> ScriptedElement {
    ScriptedElement::new([ROW_SEL])
        .child(ScriptedElement::new(["p[data-e2e='follow-user-id']"]).text(handle))
        .child(ScriptedElement::new(["span[data-e2e='follow-nickname']"]).text(name))
        .child(
            ScriptedElement::new(["a[data-e2e='follow-user-avatar']"])
                .attr("href", format!("/@{handle}")),
        )
}

#[tokio::test]
async fn full_pipeline_login_paginate_persist() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_cfg(dir.path());

    let d = ScriptedDriver::new();
    d.install(login_form()).await;
    d.when_clicked(SUBMIT_SEL, vec![remove_form()]).await;
    // The roster tab URL surfaces three visible rows.
    d.when_navigated(
        "tab=following",
        vec![Effect::Add(vec![
            roster_row("alice", "Alice A"),
            roster_row("bob", "Bob B"),
            roster_row("carol", "Carol C"),
        ])],
    )
    .await;
    // One stall, one growth, then flat until the stagnation threshold.
    d.set_heights([300, 300, 520, 520]).await;

    let report = drive_harvest(&cfg, &d).await;

    println!("🎯 outcome: {:?}", report.outcome);
    assert!(matches!(report.outcome, RunOutcome::EndOfList));
    assert_eq!(report.rounds, 5);
    assert_eq!(report.records.len(), 3);
    // Insertion order is preserved into the output.
    let keys: Vec<&str> = report.records.iter().map(|r| r.username.as_str()).collect();
    assert_eq!(keys, ["alice", "bob", "carol"]);
    assert_eq!(report.records[0].display_name, "Alice A");
    assert_eq!(report.records[0].profile_ref, "https://www.tiktok.com/@alice");

    // The persisted file is a parseable array of the same records.
    let path = report.output.expect("output path");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 3);
    assert_eq!(json[1]["username"], "bob");
    assert_eq!(json[1]["displayName"], "Bob B");

    // Direct URL navigation sufficed — the count control was never clicked.
    let calls = d.calls().await;
    assert!(!calls.iter().any(|c| c.contains("following-count")));
}

#[tokio::test]
async fn unsolved_checkpoint_fails_without_discarding_run_state() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_cfg(dir.path());

    let d = ScriptedDriver::new();
    d.install(login_form()).await;
    // Submission raises a challenge that nobody solves within the budget.
    d.when_clicked(
        SUBMIT_SEL,
        vec![Effect::Add(vec![ScriptedElement::new([CAPTCHA_SEL])])],
    )
    .await;

    let report = drive_harvest(&cfg, &d).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed(HarvestError::CaptchaTimeout { .. })
    ));
    // Nothing was harvested before the checkpoint, and nothing is persisted.
    assert!(report.records.is_empty());
    assert!(report.output.is_none());
    assert!(!cfg.output.exists());
    // The roster surface was never reached.
    let calls = d.calls().await;
    assert!(!calls.iter().any(|c| c.contains("tab=following")));
    // A diagnostics capture exists for the failure.
    assert!(std::fs::read_dir(cfg.diagnostics_dir()).unwrap().count() >= 2);
}

#[tokio::test]
async fn missing_password_candidates_abort_before_submission() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_cfg(dir.path());

    let d = ScriptedDriver::new();
    // Login form with no password input at all.
    d.install(vec![
        ScriptedElement::new([USERNAME_SEL]),
        ScriptedElement::new([SUBMIT_SEL]),
    ])
    .await;

    let report = drive_harvest(&cfg, &d).await;

    assert!(matches!(
        report.outcome,
        RunOutcome::Failed(HarvestError::LocatorUnresolved { .. })
    ));
    let calls = d.calls().await;
    assert!(!calls.iter().any(|c| c.starts_with("type:")));
    assert!(!calls.iter().any(|c| c.starts_with("click:")));
    assert!(!cfg.output.exists());
}

#[tokio::test]
async fn round_budget_exhaustion_still_persists_the_harvest() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_cfg(dir.path());
    cfg.max_rounds = 3;

    let d = ScriptedDriver::new();
    d.install(login_form()).await;
    d.when_clicked(SUBMIT_SEL, vec![remove_form()]).await;
    d.when_navigated(
        "tab=following",
        vec![Effect::Add(vec![
            roster_row("dave", "Dave D"),
            roster_row("erin", "Erin E"),
        ])],
    )
    .await;
    // Height keeps growing; the round budget is what stops the run.
    d.set_heights([100, 200, 300, 400, 500]).await;

    let report = drive_harvest(&cfg, &d).await;

    assert!(matches!(report.outcome, RunOutcome::BudgetExhausted));
    assert_eq!(report.rounds, 3);
    assert_eq!(report.records.len(), 2);
    assert!(report.output.is_some());
    assert!(cfg.output.exists());
}
