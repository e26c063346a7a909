//! The automation capability surface the harvest core consumes.
//!
//! Everything above this seam (session, pagination, harvest) talks to a
//! [`PageDriver`] and never to CDP directly, so the whole pipeline runs
//! against the scripted in-memory driver in tests. [`CdpDriver`] is the
//! production implementation over a `chromiumoxide` page.
//!
//! Element handles are transient: a [`ElementHandle`] is only valid until the
//! next `navigate` call, which invalidates the whole registry. Using a stale
//! handle is a `Browser` error, not UB.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::HarvestError;

/// Opaque reference to a live page element. Copyable, cheap, and only
/// meaningful to the driver that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub(crate) u64);

/// How long `navigate` waits before handing the page back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Navigation committed and the DOM is ready.
    DomReady,
    /// Additionally wait for the network to go quiet (lazy content settled).
    NetworkSettled,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), HarvestError>;
    async fn current_url(&self) -> Result<String, HarvestError>;

    async fn find_first(&self, selector: &str) -> Result<Option<ElementHandle>, HarvestError>;
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, HarvestError>;
    /// Scoped query inside a previously resolved element.
    async fn find_in(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, HarvestError>;

    async fn type_text(&self, el: ElementHandle, text: &str) -> Result<(), HarvestError>;
    async fn click(&self, el: ElementHandle) -> Result<(), HarvestError>;
    async fn inner_text(&self, el: ElementHandle) -> Result<String, HarvestError>;
    async fn attribute(
        &self,
        el: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;
    async fn clickable_point(&self, el: ElementHandle) -> Result<(f64, f64), HarvestError>;

    async fn move_mouse(&self, path: &[(f64, f64)]) -> Result<(), HarvestError>;
    async fn press_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError>;
    async fn release_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError>;

    /// Run page-scoped JS and return its JSON value.
    async fn evaluate(&self, js: &str) -> Result<serde_json::Value, HarvestError>;

    async fn screenshot(&self, path: &Path) -> Result<(), HarvestError>;

    async fn collect_cookies(&self) -> Result<Vec<serde_json::Value>, HarvestError>;
    /// Returns how many cookies were actually accepted.
    async fn inject_cookies(&self, raw: &[serde_json::Value]) -> Result<usize, HarvestError>;
}

// ── CDP implementation ───────────────────────────────────────────────────────

pub struct CdpDriver {
    page: Page,
    elements: Mutex<HashMap<u64, Element>>,
    next_id: AtomicU64,
    nav_timeout: Duration,
}

impl CdpDriver {
    pub fn new(page: Page, nav_timeout: Duration) -> Self {
        Self {
            page,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            nav_timeout,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn issue(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn stale(handle: ElementHandle) -> HarvestError {
        HarvestError::Browser(format!("stale element handle {}", handle.0))
    }

    /// Playwright-style networkidle heuristic: poll the resource entry count
    /// until it stops changing for `quiet_ms` while `document.readyState` is
    /// complete, bounded by the navigation timeout.
    async fn settle_network(&self, quiet_ms: u64) {
        let poll_ms = 250u64;
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed() >= self.nav_timeout {
                debug!(
                    "settle_network: timeout after {}ms",
                    self.nav_timeout.as_millis()
                );
                return;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready || count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
                debug!(
                    "settle_network: idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                return;
            }

            tokio::time::sleep(Duration::from_millis(poll_ms)).await;
        }
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), HarvestError> {
        // Every outstanding handle dies with the old document.
        self.elements.lock().await.clear();

        info!("🌐 navigate → {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| HarvestError::Browser(format!("goto {url} failed: {e}")))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| HarvestError::Browser(format!("navigation wait failed: {e}")))?;

        if wait == WaitPolicy::NetworkSettled {
            self.settle_network(600).await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HarvestError> {
        self.page
            .evaluate("location.href")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .ok_or_else(|| HarvestError::Browser("location.href unavailable".into()))
    }

    async fn find_first(&self, selector: &str) -> Result<Option<ElementHandle>, HarvestError> {
        match self.page.find_element(selector).await {
            Ok(el) => {
                let id = self.issue();
                self.elements.lock().await.insert(id, el);
                Ok(Some(ElementHandle(id)))
            }
            Err(_) => Ok(None), // no match is a result, not an error
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, HarvestError> {
        let found = self.page.find_elements(selector).await.unwrap_or_default();
        let mut els = self.elements.lock().await;
        let mut handles = Vec::with_capacity(found.len());
        for el in found {
            let id = self.issue();
            els.insert(id, el);
            handles.push(ElementHandle(id));
        }
        Ok(handles)
    }

    async fn find_in(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, HarvestError> {
        let mut els = self.elements.lock().await;
        let parent = els.get(&scope.0).ok_or_else(|| Self::stale(scope))?;
        match parent.find_element(selector).await {
            Ok(child) => {
                let id = self.issue();
                els.insert(id, child);
                Ok(Some(ElementHandle(id)))
            }
            Err(_) => Ok(None),
        }
    }

    async fn type_text(&self, el: ElementHandle, text: &str) -> Result<(), HarvestError> {
        let els = self.elements.lock().await;
        let element = els.get(&el.0).ok_or_else(|| Self::stale(el))?;
        element
            .click()
            .await
            .map_err(|e| HarvestError::Browser(format!("focus click failed: {e}")))?;
        element
            .type_str(text)
            .await
            .map_err(|e| HarvestError::Browser(format!("type failed: {e}")))?;
        Ok(())
    }

    async fn click(&self, el: ElementHandle) -> Result<(), HarvestError> {
        let els = self.elements.lock().await;
        let element = els.get(&el.0).ok_or_else(|| Self::stale(el))?;
        element
            .click()
            .await
            .map_err(|e| HarvestError::Browser(format!("click failed: {e}")))?;
        Ok(())
    }

    async fn inner_text(&self, el: ElementHandle) -> Result<String, HarvestError> {
        let els = self.elements.lock().await;
        let element = els.get(&el.0).ok_or_else(|| Self::stale(el))?;
        Ok(element
            .inner_text()
            .await
            .map_err(|e| HarvestError::Browser(format!("inner_text failed: {e}")))?
            .unwrap_or_default())
    }

    async fn attribute(
        &self,
        el: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let els = self.elements.lock().await;
        let element = els.get(&el.0).ok_or_else(|| Self::stale(el))?;
        element
            .attribute(name)
            .await
            .map_err(|e| HarvestError::Browser(format!("attribute({name}) failed: {e}")))
    }

    async fn clickable_point(&self, el: ElementHandle) -> Result<(f64, f64), HarvestError> {
        let els = self.elements.lock().await;
        let element = els.get(&el.0).ok_or_else(|| Self::stale(el))?;
        let p = element
            .clickable_point()
            .await
            .map_err(|e| HarvestError::Browser(format!("clickable_point failed: {e}")))?;
        Ok((p.x, p.y))
    }

    async fn move_mouse(&self, path: &[(f64, f64)]) -> Result<(), HarvestError> {
        for &(x, y) in path {
            let params = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(x)
                .y(y)
                .build()
                .map_err(HarvestError::Browser)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| HarvestError::Browser(format!("mouse move failed: {e}")))?;
        }
        Ok(())
    }

    async fn press_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(HarvestError::Browser)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| HarvestError::Browser(format!("mouse press failed: {e}")))?;
        Ok(())
    }

    async fn release_mouse(&self, x: f64, y: f64) -> Result<(), HarvestError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(HarvestError::Browser)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| HarvestError::Browser(format!("mouse release failed: {e}")))?;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value, HarvestError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| HarvestError::Browser(format!("evaluate failed: {e}")))?
            .into_value::<serde_json::Value>()
            .map_err(|e| HarvestError::Browser(format!("evaluate result not JSON: {e}")))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), HarvestError> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| HarvestError::Browser(format!("screenshot failed: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    async fn collect_cookies(&self) -> Result<Vec<serde_json::Value>, HarvestError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| HarvestError::Browser(format!("getCookies failed: {e}")))?;
        Ok(cookies
            .iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .collect())
    }

    async fn inject_cookies(&self, raw: &[serde_json::Value]) -> Result<usize, HarvestError> {
        // Individually malformed cookies are skipped so a partially stale jar
        // never blocks a run.
        let params: Vec<CookieParam> = raw
            .iter()
            .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
            .collect();
        if params.is_empty() {
            warn!("💉 cookie jar contained no usable cookies — skipping injection");
            return Ok(0);
        }
        let count = params.len();
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .map_err(|e| HarvestError::Browser(format!("setCookies failed: {e}")))?;
        debug!("💉 injected {} cookies", count);
        Ok(count)
    }
}
