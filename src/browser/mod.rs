//! Native browser management over `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (env override → PATH → well-known
//!   install paths, Brave → Chrome → Chromium order).
//! * Building the launch config (viewport, stealth flags, random UA,
//!   headless/headful toggle).
//! * `BrowserSession` — one browser, one page, one CDP handler task, with a
//!   close path that runs on every exit and a `Drop` backstop.
//!
//! Everything above this module consumes the page through the
//! [`PageDriver`] seam in [`driver`].

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

pub mod driver;
pub mod scripted;
pub mod stealth;
pub mod wait;

pub use driver::{CdpDriver, ElementHandle, PageDriver, WaitPolicy};
pub use scripted::{Effect, ScriptedDriver, ScriptedElement};
pub use wait::wait_until;

use crate::core::config::chrome_executable_override;

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Windows, Chrome 132
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // macOS, Chrome 132
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Linux, Chrome 131
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Windows, Edge 132
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Pick one of the pooled desktop User-Agent strings at random.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Locate a Chromium-family executable to drive.
///
/// Checked in order: the `CHROME_EXECUTABLE` override, then every PATH
/// directory (covers package-manager installs), then the per-OS default
/// install locations. Brave is preferred over Chrome over Chromium.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Assemble the launch configuration.
///
/// The flag set keeps the browser usable in CI and containers
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and strips the obvious
/// automation tells: `--disable-blink-features=AutomationControlled` plus a
/// pooled desktop User-Agent. `headful` opens a visible window, which the
/// manual CAPTCHA strategy needs since a human has to see the checkpoint.
pub fn build_browser_config(exe: &str, headful: bool, width: u32, height: u32) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        // Hide the automation fingerprint from page scripts
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if headful {
        builder = builder.with_head();
    } else {
        builder = builder.arg("--hide-scrollbars");
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session lifecycle ────────────────────────────────────────────────────────

/// One launched browser with one working page and its CDP event pump.
///
/// `close()` is the normal release path and is safe to call exactly once per
/// run; `Drop` aborts the handler task and fires a best-effort async close as
/// a backstop so an early `?` return never leaks a Chromium process.
pub struct BrowserSession {
    browser: Option<Browser>,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(headful: bool, stealth: bool) -> Result<Self> {
        let exe = find_chrome_executable()
            .ok_or_else(|| anyhow!("Browser executable not found (tried Brave, Chrome, Chromium)"))?;

        info!("🚀 launching browser ({}, headful={})", exe, headful);
        let config = build_browser_config(&exe, headful, 1440, 900)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch {}: {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open page: {}", e))?;

        if stealth {
            stealth::inject(&page).await?;
        }

        Ok(Self {
            browser: Some(browser),
            page,
            handler_task,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Build the production driver over this session's page.
    pub fn driver(&self, nav_timeout: Duration) -> CdpDriver {
        CdpDriver::new(self.page.clone(), nav_timeout)
    }

    /// Graceful release: close the browser, wait for the process, stop the
    /// event pump. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            info!("🗑️ closing browser session");
            let _ = browser.close().await;
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        // Drop cannot await; if we're inside a tokio runtime, spawn a task to
        // close the browser and avoid zombie Chromium processes.
        if let Some(mut browser) = self.browser.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                });
            }
        }
    }
}
