//! Environment-sourced run configuration.
//!
//! Presence-only validation: credentials and the target handle must be set,
//! everything else falls back to a sane default. Values are opaque strings
//! here — no format checks, the site decides what it accepts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::HarvestError;
use super::types::ListKind;

pub const ENV_USERNAME: &str = "ROSTER_USERNAME";
pub const ENV_PASSWORD: &str = "ROSTER_PASSWORD";
pub const ENV_TARGET: &str = "ROSTER_TARGET";
pub const ENV_LIST: &str = "ROSTER_LIST";
pub const ENV_BASE_URL: &str = "ROSTER_BASE_URL";
pub const ENV_OUTPUT: &str = "ROSTER_OUTPUT";
pub const ENV_MAX_ROUNDS: &str = "ROSTER_MAX_ROUNDS";
pub const ENV_SETTLE_MS: &str = "ROSTER_SETTLE_MS";
pub const ENV_STAGNATION_ROUNDS: &str = "ROSTER_STAGNATION_ROUNDS";
pub const ENV_CAPTCHA_TIMEOUT_SECS: &str = "ROSTER_CAPTCHA_TIMEOUT_SECS";
pub const ENV_NAV_TIMEOUT_SECS: &str = "ROSTER_NAV_TIMEOUT_SECS";
pub const ENV_CAPTCHA_STRATEGY: &str = "ROSTER_CAPTCHA_STRATEGY";
pub const ENV_HEADFUL: &str = "ROSTER_HEADFUL";
pub const ENV_STEALTH: &str = "ROSTER_STEALTH";
pub const ENV_REUSE_SESSION: &str = "ROSTER_REUSE_SESSION";
pub const ENV_STATE_DIR: &str = "ROSTER_STATE_DIR";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Which CAPTCHA-solving strategy the session runs when the checkpoint
/// marker appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaMode {
    /// Wait for a human to clear the checkpoint (needs a headful browser).
    Manual,
    /// Attempt the slider drag automatically, manual wait as fallback.
    Slider,
    /// No solving and no waiting — fail fast for unattended runs.
    Off,
}

impl CaptchaMode {
    fn parse(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "manual" | "human" => Some(Self::Manual),
            "slider" | "auto" => Some(Self::Slider),
            "off" | "none" | "noop" => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub username: String,
    pub password: String,
    pub target: String,
    pub list: ListKind,
    pub base_url: String,
    pub output: PathBuf,
    pub max_rounds: usize,
    pub settle: Duration,
    pub stagnation_threshold: u32,
    pub captcha_timeout: Duration,
    pub nav_timeout: Duration,
    pub captcha_mode: CaptchaMode,
    pub headful: bool,
    pub stealth: bool,
    pub reuse_session: bool,
    pub state_dir: PathBuf,
}

impl HarvestConfig {
    /// Build the configuration from the environment.
    ///
    /// Fails with [`HarvestError::MissingConfig`] before any browser
    /// interaction when one of the three required variables is absent.
    pub fn from_env() -> Result<Self, HarvestError> {
        let username = required(ENV_USERNAME)?;
        let password = required(ENV_PASSWORD)?;
        let target = required(ENV_TARGET)?;

        let list = std::env::var(ENV_LIST)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ListKind::Following);

        let base_url = env_string(ENV_BASE_URL, "https://www.tiktok.com");
        let output = PathBuf::from(env_string(ENV_OUTPUT, "./roster.json"));

        Ok(Self {
            username,
            password,
            target: target.trim_start_matches('@').to_string(),
            list,
            base_url,
            output,
            max_rounds: env_parse(ENV_MAX_ROUNDS, 40usize),
            settle: Duration::from_millis(env_parse(ENV_SETTLE_MS, 1500u64)),
            stagnation_threshold: env_parse(ENV_STAGNATION_ROUNDS, 3u32),
            captcha_timeout: Duration::from_secs(env_parse(ENV_CAPTCHA_TIMEOUT_SECS, 60u64)),
            nav_timeout: Duration::from_secs(env_parse(ENV_NAV_TIMEOUT_SECS, 30u64)),
            captcha_mode: std::env::var(ENV_CAPTCHA_STRATEGY)
                .ok()
                .and_then(|v| CaptchaMode::parse(&v))
                .unwrap_or(CaptchaMode::Manual),
            headful: env_flag(ENV_HEADFUL, false),
            stealth: env_flag(ENV_STEALTH, true),
            reuse_session: env_flag(ENV_REUSE_SESSION, true),
            state_dir: state_dir(),
        })
    }

    /// Login surface for the configured site.
    pub fn login_url(&self) -> String {
        format!("{}/login/phone-or-email/email", self.base_url.trim_end_matches('/'))
    }

    /// Profile page of the target account.
    pub fn profile_url(&self) -> String {
        format!("{}/@{}", self.base_url.trim_end_matches('/'), self.target)
    }

    /// Direct URL of the roster surface (primary navigation path; the
    /// count-control click is only a fallback when this does not surface
    /// the record container).
    pub fn roster_url(&self) -> String {
        format!("{}?lang=en&tab={}", self.profile_url(), self.list.path_segment())
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.state_dir.join("diagnostics")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }
}

fn required(key: &'static str) -> Result<String, HarvestError> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(HarvestError::MissingConfig(key))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean env flag: `1|true|yes|on` → true, `0|false|no|off` → false,
/// unset or unrecognized → `default`.
pub fn env_flag(key: &str, default: bool) -> bool {
    let Ok(v) = std::env::var(key) else {
        return default;
    };
    let v = v.trim().to_ascii_lowercase();
    if matches!(v.as_str(), "1" | "true" | "yes" | "on") {
        return true;
    }
    if matches!(v.as_str(), "0" | "false" | "no" | "off") {
        return false;
    }
    default
}

/// State root for cookie jars and diagnostics: `ROSTER_STATE_DIR` →
/// `~/.roster-scout` → temp dir when no home is resolvable.
pub fn state_dir() -> PathBuf {
    if let Ok(v) = std::env::var(ENV_STATE_DIR) {
        let v = v.trim();
        if !v.is_empty() {
            return PathBuf::from(v);
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".roster-scout"))
        .unwrap_or_else(|| std::env::temp_dir().join("roster-scout"))
}

/// Explicit browser binary from `CHROME_EXECUTABLE`, honored only when the
/// path actually exists. Anything else falls back to auto-discovery in
/// `browser::find_chrome_executable`.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
