//! Adaptive element location with ordered fallback chains.
//!
//! The target site ships markup changes without notice, so every element the
//! harvester touches is described as a [`LocatorSpec`]: an ordered list of
//! candidate selectors, tried in order against the live page. Not matching
//! anything is a first-class `None`, not an error — callers decide whether an
//! unresolved locator is fatal (credential fields) or just means the feature
//! is absent (popups, optional record sub-fields).

use tracing::debug;

use crate::browser::{ElementHandle, PageDriver};

pub mod site;

/// Named, ordered fallback chain of CSS selector candidates.
///
/// Order matters: put the most specific, most current selector first and the
/// broad structural fallbacks last.
#[derive(Debug, Clone, Copy)]
pub struct LocatorSpec {
    pub name: &'static str,
    candidates: &'static [&'static str],
}

impl LocatorSpec {
    pub const fn new(name: &'static str, candidates: &'static [&'static str]) -> Self {
        Self { name, candidates }
    }

    pub fn candidates(&self) -> &'static [&'static str] {
        self.candidates
    }
}

/// A live match: the element handle plus which candidate found it.
#[derive(Debug, Clone, Copy)]
pub struct Resolved {
    pub handle: ElementHandle,
    pub candidate_index: usize,
}

/// Try each candidate in order against the whole document; first live match
/// wins and later candidates are never queried. Transport errors on one
/// candidate are logged and treated as a non-match so the chain continues.
pub async fn resolve(driver: &dyn PageDriver, spec: &LocatorSpec) -> Option<Resolved> {
    for (i, selector) in spec.candidates.iter().enumerate() {
        match driver.find_first(selector).await {
            Ok(Some(handle)) => {
                if i > 0 {
                    debug!("locator '{}': fell back to candidate {} ({})", spec.name, i, selector);
                }
                return Some(Resolved {
                    handle,
                    candidate_index: i,
                });
            }
            Ok(None) => {}
            Err(e) => {
                debug!("locator '{}': candidate {} errored: {}", spec.name, i, e);
            }
        }
    }
    debug!(
        "locator '{}': unresolved after {} candidates",
        spec.name,
        spec.candidates.len()
    );
    None
}

/// Like [`resolve`] but scoped to a previously resolved element.
pub async fn resolve_within(
    driver: &dyn PageDriver,
    scope: ElementHandle,
    spec: &LocatorSpec,
) -> Option<Resolved> {
    for (i, selector) in spec.candidates.iter().enumerate() {
        match driver.find_in(scope, selector).await {
            Ok(Some(handle)) => {
                return Some(Resolved {
                    handle,
                    candidate_index: i,
                })
            }
            Ok(None) => {}
            Err(e) => {
                debug!("locator '{}': scoped candidate {} errored: {}", spec.name, i, e);
            }
        }
    }
    None
}

/// All matches of the first candidate that matches anything. Used for the
/// per-record containers, where the winning variant should supply the whole
/// visible set.
pub async fn resolve_all(driver: &dyn PageDriver, spec: &LocatorSpec) -> Vec<ElementHandle> {
    for (i, selector) in spec.candidates.iter().enumerate() {
        let found = driver.find_all(selector).await.unwrap_or_default();
        if !found.is_empty() {
            if i > 0 {
                debug!(
                    "locator '{}': candidate {} matched {} elements",
                    spec.name,
                    i,
                    found.len()
                );
            }
            return found;
        }
    }
    Vec::new()
}
