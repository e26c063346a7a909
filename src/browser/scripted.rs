//! In-memory [`PageDriver`] with scripted behavior.
//!
//! Backs the offline test suite: a fake DOM of [`ScriptedElement`]s, a
//! scripted document-height sequence (the last value repeats once the
//! sequence is exhausted), navigation/click side effects, and selectors that
//! vanish after a given number of queries (how a clearing CAPTCHA marker or
//! a disappearing login form is simulated). Every interaction is appended to
//! a call log so tests can assert ordering and absence.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::HarvestError;

use super::driver::{ElementHandle, PageDriver, WaitPolicy};

#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    /// Selector strings this element answers to (exact match).
    pub selectors: Vec<String>,
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<ScriptedElement>,
}

impl ScriptedElement {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn text(mut self, t: impl Into<String>) -> Self {
        self.text = t.into();
        self
    }

    pub fn attr(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.attrs.insert(k.into(), v.into());
        self
    }

    pub fn child(mut self, c: ScriptedElement) -> Self {
        self.children.push(c);
        self
    }

    fn matches(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }
}

/// Side effect attached to a navigation or a click.
#[derive(Debug, Clone)]
pub enum Effect {
    Add(Vec<ScriptedElement>),
    /// Remove every element matching any of these selectors.
    Remove(Vec<String>),
    /// Add an element whose selectors stop matching after `polls` queries.
    AddVanishing { element: ScriptedElement, polls: u32 },
}

#[derive(Default)]
struct ScriptState {
    dom: Vec<ScriptedElement>,
    /// selector → queries remaining before matching elements are removed.
    vanish: HashMap<String, u32>,
    heights: VecDeque<u64>,
    url: String,
    on_navigate: Vec<(String, Vec<Effect>)>,
    on_click: Vec<(String, Vec<Effect>)>,
    handles: HashMap<u64, ScriptedElement>,
    next_id: u64,
    cookie_jar: Vec<serde_json::Value>,
}

impl ScriptState {
    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Add(els) => self.dom.extend(els.iter().cloned()),
                Effect::Remove(sels) => {
                    self.dom.retain(|el| !sels.iter().any(|s| el.matches(s)));
                }
                Effect::AddVanishing { element, polls } => {
                    for s in &element.selectors {
                        self.vanish.insert(s.clone(), *polls);
                    }
                    self.dom.push(element.clone());
                }
            }
        }
    }

    /// Count down a vanishing selector: it keeps matching for its remaining
    /// budget of queries and drops out of the DOM once the budget is spent.
    fn tick_vanish(&mut self, selector: &str) {
        if let Some(left) = self.vanish.get_mut(selector) {
            if *left == 0 {
                self.vanish.remove(selector);
                self.dom.retain(|el| !el.matches(selector));
            } else {
                *left -= 1;
            }
        }
    }

    fn find_recursive<'a>(els: &'a [ScriptedElement], selector: &str) -> Vec<&'a ScriptedElement> {
        let mut out = Vec::new();
        for el in els {
            if el.matches(selector) {
                out.push(el);
            }
            out.extend(Self::find_recursive(&el.children, selector));
        }
        out
    }

    fn issue(&mut self, el: ScriptedElement) -> ElementHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.handles.insert(id, el);
        ElementHandle(id)
    }
}

#[derive(Default)]
pub struct ScriptedDriver {
    state: Mutex<ScriptState>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put elements into the current document.
    pub async fn install(&self, elements: Vec<ScriptedElement>) {
        self.state.lock().await.dom.extend(elements);
    }

    /// Script side effects for navigations whose URL contains `url_part`.
    pub async fn when_navigated(&self, url_part: impl Into<String>, effects: Vec<Effect>) {
        self.state
            .lock()
            .await
            .on_navigate
            .push((url_part.into(), effects));
    }

    /// Script side effects for clicks on elements matching `selector`.
    pub async fn when_clicked(&self, selector: impl Into<String>, effects: Vec<Effect>) {
        self.state
            .lock()
            .await
            .on_click
            .push((selector.into(), effects));
    }

    /// Scripted `document height` sequence; the last value repeats forever.
    pub async fn set_heights(&self, heights: impl IntoIterator<Item = u64>) {
        self.state.lock().await.heights = heights.into_iter().collect();
    }

    /// Let elements matching `selector` answer exactly `polls` more queries,
    /// then disappear from the document.
    pub async fn vanish_after(&self, selector: impl Into<String>, polls: u32) {
        self.state.lock().await.vanish.insert(selector.into(), polls);
    }

    /// Cookies the driver will report from `collect_cookies`.
    pub async fn set_cookie_jar(&self, jar: Vec<serde_json::Value>) {
        self.state.lock().await.cookie_jar = jar;
    }

    pub async fn dom_matches(&self, selector: &str) -> bool {
        let state = self.state.lock().await;
        !ScriptState::find_recursive(&state.dom, selector).is_empty()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn log(&self, entry: String) {
        self.calls.lock().await.push(entry);
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str, _wait: WaitPolicy) -> Result<(), HarvestError> {
        self.log(format!("navigate:{url}")).await;
        let mut state = self.state.lock().await;
        state.handles.clear();
        state.url = url.to_string();
        let effects: Vec<Effect> = state
            .on_navigate
            .iter()
            .filter(|(part, _)| url.contains(part.as_str()))
            .flat_map(|(_, e)| e.iter().cloned())
            .collect();
        state.apply(&effects);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HarvestError> {
        Ok(self.state.lock().await.url.clone())
    }

    async fn find_first(&self, selector: &str) -> Result<Option<ElementHandle>, HarvestError> {
        let mut state = self.state.lock().await;
        state.tick_vanish(selector);
        let found = ScriptState::find_recursive(&state.dom, selector)
            .first()
            .map(|el| (*el).clone());
        drop(state);
        match found {
            Some(el) => {
                self.log(format!("find:{selector}:hit")).await;
                let handle = self.state.lock().await.issue(el);
                Ok(Some(handle))
            }
            None => {
                self.log(format!("find:{selector}:miss")).await;
                Ok(None)
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>, HarvestError> {
        let mut state = self.state.lock().await;
        state.tick_vanish(selector);
        let found: Vec<ScriptedElement> = ScriptState::find_recursive(&state.dom, selector)
            .into_iter()
            .cloned()
            .collect();
        let handles = found
            .into_iter()
            .map(|el| state.issue(el))
            .collect::<Vec<_>>();
        drop(state);
        self.log(format!("find_all:{selector}:{}", handles.len()))
            .await;
        Ok(handles)
    }

    async fn find_in(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, HarvestError> {
        let mut state = self.state.lock().await;
        let parent = state
            .handles
            .get(&scope.0)
            .cloned()
            .ok_or_else(|| HarvestError::Browser(format!("stale scripted handle {}", scope.0)))?;
        let child = ScriptState::find_recursive(&parent.children, selector)
            .first()
            .map(|el| (*el).clone());
        Ok(child.map(|el| state.issue(el)))
    }

    async fn type_text(&self, el: ElementHandle, text: &str) -> Result<(), HarvestError> {
        let state = self.state.lock().await;
        let target = state
            .handles
            .get(&el.0)
            .ok_or_else(|| HarvestError::Browser(format!("stale scripted handle {}", el.0)))?;
        let label = target.selectors.first().cloned().unwrap_or_default();
        drop(state);
        self.log(format!("type:{label}:{text}")).await;
        Ok(())
    }

    async fn click(&self, el: ElementHandle) -> Result<(), HarvestError> {
        let mut state = self.state.lock().await;
        let target = state
            .handles
            .get(&el.0)
            .cloned()
            .ok_or_else(|| HarvestError::Browser(format!("stale scripted handle {}", el.0)))?;
        let effects: Vec<Effect> = state
            .on_click
            .iter()
            .filter(|(sel, _)| target.matches(sel))
            .flat_map(|(_, e)| e.iter().cloned())
            .collect();
        state.apply(&effects);
        drop(state);
        let label = target.selectors.first().cloned().unwrap_or_default();
        self.log(format!("click:{label}")).await;
        Ok(())
    }

    async fn inner_text(&self, el: ElementHandle) -> Result<String, HarvestError> {
        let state = self.state.lock().await;
        state
            .handles
            .get(&el.0)
            .map(|e| e.text.clone())
            .ok_or_else(|| HarvestError::Browser(format!("stale scripted handle {}", el.0)))
    }

    async fn attribute(
        &self,
        el: ElementHandle,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        let state = self.state.lock().await;
        state
            .handles
            .get(&el.0)
            .map(|e| e.attrs.get(name).cloned())
            .ok_or_else(|| HarvestError::Browser(format!("stale scripted handle {}", el.0)))
    }

    async fn clickable_point(&self, el: ElementHandle) -> Result<(f64, f64), HarvestError> {
        let state = self.state.lock().await;
        if !state.handles.contains_key(&el.0) {
            return Err(HarvestError::Browser(format!(
                "stale scripted handle {}",
                el.0
            )));
        }
        Ok((20.0, 20.0))
    }

    async fn move_mouse(&self, path: &[(f64, f64)]) -> Result<(), HarvestError> {
        self.log(format!("move_mouse:{}", path.len())).await;
        Ok(())
    }

    async fn press_mouse(&self, _x: f64, _y: f64) -> Result<(), HarvestError> {
        self.log("press_mouse".to_string()).await;
        Ok(())
    }

    async fn release_mouse(&self, _x: f64, _y: f64) -> Result<(), HarvestError> {
        self.log("release_mouse".to_string()).await;
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value, HarvestError> {
        if js.contains("scrollTo") {
            self.log("scroll_to_bottom".to_string()).await;
            return Ok(serde_json::Value::Null);
        }
        if js.contains("scrollHeight") {
            let mut state = self.state.lock().await;
            let h = if state.heights.len() > 1 {
                state.heights.pop_front().unwrap_or(0)
            } else {
                state.heights.front().copied().unwrap_or(0)
            };
            return Ok(serde_json::json!(h));
        }
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), HarvestError> {
        self.log(format!("screenshot:{}", path.display())).await;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"scripted-png")?;
        Ok(())
    }

    async fn collect_cookies(&self) -> Result<Vec<serde_json::Value>, HarvestError> {
        Ok(self.state.lock().await.cookie_jar.clone())
    }

    async fn inject_cookies(&self, raw: &[serde_json::Value]) -> Result<usize, HarvestError> {
        self.log(format!("inject_cookies:{}", raw.len())).await;
        Ok(raw.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vanishing_selector_stops_matching_after_budget() {
        let d = ScriptedDriver::new();
        d.install(vec![ScriptedElement::new(["div.captcha"])]).await;
        d.vanish_after("div.captcha", 2).await;

        assert!(d.find_first("div.captcha").await.unwrap().is_some());
        assert!(d.find_first("div.captcha").await.unwrap().is_some());
        // Budget spent: gone from here on.
        assert!(d.find_first("div.captcha").await.unwrap().is_none());
        assert!(d.find_first("div.captcha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn height_sequence_repeats_last_value() {
        let d = ScriptedDriver::new();
        d.set_heights([100, 200]).await;
        for expect in [100u64, 200, 200, 200] {
            let h = d
                .evaluate("document.body.scrollHeight")
                .await
                .unwrap()
                .as_u64()
                .unwrap();
            assert_eq!(h, expect);
        }
    }

    #[tokio::test]
    async fn click_effects_mutate_the_dom() {
        let d = ScriptedDriver::new();
        d.install(vec![
            ScriptedElement::new(["button.submit"]),
            ScriptedElement::new(["form.login"]),
        ])
        .await;
        d.when_clicked("button.submit", vec![Effect::Remove(vec!["form.login".into()])])
            .await;

        let btn = d.find_first("button.submit").await.unwrap().unwrap();
        d.click(btn).await.unwrap();
        assert!(!d.dom_matches("form.login").await);
    }

    #[tokio::test]
    async fn navigation_invalidates_handles() {
        let d = ScriptedDriver::new();
        d.install(vec![ScriptedElement::new(["a.profile"]).text("@alice")])
            .await;
        let h = d.find_first("a.profile").await.unwrap().unwrap();
        assert_eq!(d.inner_text(h).await.unwrap(), "@alice");

        d.navigate("https://example.com/next", WaitPolicy::DomReady)
            .await
            .unwrap();
        assert!(d.inner_text(h).await.is_err());
    }
}
