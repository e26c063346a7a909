//! Session establishment against the login-gated site.
//!
//! Owns the authentication state machine:
//!
//! ```text
//! Unauthenticated → AwaitingCredentials → (AwaitingCaptcha →) Authenticated
//!                                      ↘                    ↘ Failed
//! ```
//!
//! Transitions are one-directional; terminal states are `Authenticated` and
//! `Failed`, and a fresh run starts a fresh session. On top of the credential
//! flow this module carries the cookie-jar fast path (a previous run's
//! session is injected before navigation and, when the site still honors it,
//! the whole login sequence is skipped) and the best-effort dismissal of
//! post-login popups.

use std::path::PathBuf;
use std::time::Duration;

use rand::distr::{Distribution, Uniform};
use tracing::{debug, info, warn};

use crate::browser::{wait_until, PageDriver, WaitPolicy};
use crate::core::{CaptchaMode, HarvestConfig, HarvestError};
use crate::locator::{self, site};

pub mod captcha;

use captcha::{strategy_for, SolveOutcome};

const POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AwaitingCredentials,
    AwaitingCaptcha,
    Authenticated,
    Failed,
}

/// Outcome of the post-submit race: the page either settles past the login
/// form or the verification checkpoint comes up first.
enum PostSubmit {
    Captcha,
    Settled,
}

pub struct SessionEstablisher<'a> {
    cfg: &'a HarvestConfig,
    state: SessionState,
}

impl<'a> SessionEstablisher<'a> {
    pub fn new(cfg: &'a HarvestConfig) -> Self {
        Self {
            cfg,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        info!("🔐 session: {:?} → {:?}", self.state, next);
        self.state = next;
    }

    /// Drive the session to `Authenticated`. Any error leaves the machine in
    /// `Failed`; there is no re-entry.
    pub async fn establish(&mut self, driver: &dyn PageDriver) -> Result<(), HarvestError> {
        match self.drive(driver).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, driver: &dyn PageDriver) -> Result<(), HarvestError> {
        let via_jar = self.cfg.reuse_session && self.try_stored_session(driver).await?;
        if !via_jar {
            self.login(driver).await?;
        }
        dismiss_popups(driver).await;
        if self.cfg.reuse_session {
            self.save_session(driver).await;
        }
        Ok(())
    }

    /// Inject a stored cookie jar and probe whether the site still honors
    /// it. `Ok(true)` means authenticated without touching the login form.
    async fn try_stored_session(&mut self, driver: &dyn PageDriver) -> Result<bool, HarvestError> {
        let Some(jar) = load_jar(self.cfg) else {
            return Ok(false);
        };
        if driver.inject_cookies(&jar).await? == 0 {
            return Ok(false);
        }
        driver
            .navigate(&self.cfg.profile_url(), WaitPolicy::NetworkSettled)
            .await?;

        if locator::resolve(driver, &site::LOGGED_OUT_MARKER).await.is_none() {
            info!("🍪 stored session accepted — login skipped");
            self.transition(SessionState::Authenticated);
            return Ok(true);
        }
        info!("🍪 stored session stale — falling back to credential login");
        invalidate_jar(self.cfg);
        Ok(false)
    }

    async fn login(&mut self, driver: &dyn PageDriver) -> Result<(), HarvestError> {
        driver
            .navigate(&self.cfg.login_url(), WaitPolicy::NetworkSettled)
            .await?;
        self.transition(SessionState::AwaitingCredentials);

        // Both credential fields are mandatory and resolved up front, so a
        // broken form never receives a half-typed login.
        let username = locator::resolve(driver, &site::USERNAME_INPUT)
            .await
            .ok_or(HarvestError::LocatorUnresolved {
                what: site::USERNAME_INPUT.name,
            })?;
        let password = locator::resolve(driver, &site::PASSWORD_INPUT)
            .await
            .ok_or(HarvestError::LocatorUnresolved {
                what: site::PASSWORD_INPUT.name,
            })?;

        driver.type_text(username.handle, &self.cfg.username).await?;
        human_pause(300, 900).await;
        driver.type_text(password.handle, &self.cfg.password).await?;
        human_pause(200, 600).await;

        let submit = locator::resolve(driver, &site::LOGIN_SUBMIT)
            .await
            .ok_or(HarvestError::LocatorUnresolved {
                what: site::LOGIN_SUBMIT.name,
            })?;
        driver.click(submit.handle).await?;

        let outcome = wait_until(POLL, self.cfg.nav_timeout, || async move {
            if captcha::challenge_present(driver).await {
                return Some(PostSubmit::Captcha);
            }
            if locator::resolve(driver, &site::LOGIN_SUBMIT).await.is_none() {
                return Some(PostSubmit::Settled);
            }
            None
        })
        .await;

        match outcome {
            Some(PostSubmit::Captcha) => self.clear_checkpoint(driver).await?,
            Some(PostSubmit::Settled) => {}
            None => {
                return Err(HarvestError::NavigationTimeout {
                    what: "post-login settle",
                })
            }
        }

        // Authentication is verified by the *absence* of the logged-out
        // marker; the site exposes no positive signal worth trusting.
        if locator::resolve(driver, &site::LOGGED_OUT_MARKER).await.is_some() {
            warn!("❌ login control still present after submit");
            return Err(HarvestError::CredentialsRejected);
        }
        self.transition(SessionState::Authenticated);
        Ok(())
    }

    async fn clear_checkpoint(&mut self, driver: &dyn PageDriver) -> Result<(), HarvestError> {
        self.transition(SessionState::AwaitingCaptcha);
        if self.cfg.captcha_mode == CaptchaMode::Manual && !self.cfg.headful {
            warn!("🧩 manual challenge solving needs a visible window (ROSTER_HEADFUL=1)");
        }
        let strategy = strategy_for(self.cfg.captcha_mode);
        debug!("challenge strategy: {}", strategy.name());
        match strategy.solve(driver, self.cfg.captcha_timeout).await {
            SolveOutcome::Cleared => Ok(()),
            SolveOutcome::StillPresent => Err(HarvestError::CaptchaTimeout {
                waited_secs: self.cfg.captcha_timeout.as_secs(),
            }),
        }
    }

    /// Persist the live cookie jar so the next run can skip the login.
    /// Best-effort: failure is logged, never propagated.
    async fn save_session(&self, driver: &dyn PageDriver) {
        match driver.collect_cookies().await {
            Ok(jar) if !jar.is_empty() => save_jar(self.cfg, &jar),
            Ok(_) => debug!("cookie jar empty — nothing to persist"),
            Err(e) => warn!("cookie collection failed: {e}"),
        }
    }
}

/// Best-effort pass over the known transient popups. Not finding one is the
/// normal case; a dismissal that fails is logged and skipped.
pub async fn dismiss_popups(driver: &dyn PageDriver) {
    for spec in site::POPUP_DISMISSERS {
        let Some(found) = locator::resolve(driver, spec).await else {
            continue;
        };
        match driver.click(found.handle).await {
            Ok(()) => info!("🧹 dismissed popup: {}", spec.name),
            Err(e) => debug!("popup '{}' did not dismiss cleanly: {}", spec.name, e),
        }
    }
}

/// Short randomized pause between form interactions.
async fn human_pause(lo_ms: u64, hi_ms: u64) {
    // rand's Rng is not Send; sample before the await.
    let ms = {
        let mut rng = rand::rng();
        Uniform::new(lo_ms, hi_ms).unwrap().sample(&mut rng)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ── Cookie jar ───────────────────────────────────────────────────────────────

fn host_to_key(host: &str) -> String {
    host.replace('.', "_").replace(':', "_")
}

/// Jar location for the configured site, e.g. `https://www.tiktok.com` →
/// `{state_dir}/sessions/www_tiktok_com.json`.
pub fn jar_path(cfg: &HarvestConfig) -> Option<PathBuf> {
    let url = url::Url::parse(&cfg.base_url).ok()?;
    let host = url.host_str()?;
    Some(cfg.sessions_dir().join(format!("{}.json", host_to_key(host))))
}

fn load_jar(cfg: &HarvestConfig) -> Option<Vec<serde_json::Value>> {
    let path = jar_path(cfg)?;
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    let jar: Vec<serde_json::Value> = serde_json::from_str(&content).ok()?;
    if jar.is_empty() {
        return None;
    }
    info!("🍪 loaded {} cookies from {}", jar.len(), path.display());
    Some(jar)
}

fn save_jar(cfg: &HarvestConfig, jar: &[serde_json::Value]) {
    let Some(path) = jar_path(cfg) else {
        return;
    };
    let body = match serde_json::to_vec_pretty(jar) {
        Ok(b) => b,
        Err(e) => {
            warn!("cookie jar serialize failed: {e}");
            return;
        }
    };
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a torn jar.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &body)?;
        std::fs::rename(&tmp, &path)
    };
    match write() {
        Ok(()) => info!("🍪 saved {} cookies to {}", jar.len(), path.display()),
        Err(e) => warn!("cookie jar save failed: {e}"),
    }
}

fn invalidate_jar(cfg: &HarvestConfig) {
    let Some(path) = jar_path(cfg) else {
        return;
    };
    if path.exists() {
        match std::fs::remove_file(&path) {
            Ok(()) => info!("🗑️ removed stale session jar {}", path.display()),
            Err(e) => warn!("failed to remove stale jar {}: {e}", path.display()),
        }
    }
}
