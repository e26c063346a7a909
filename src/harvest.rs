//! Record extraction and the deduplicating accumulator.
//!
//! Each pagination round re-extracts everything currently visible, because
//! virtualized lists reshuffle and re-render rows constantly. The
//! accumulator makes that safe: insertion is merge-if-absent keyed by the
//! normalized username, so re-seeing a row is a no-op and the first
//! extraction of an identity always wins.
//!
//! Extraction itself is two-tier: structured sub-locators inside the record
//! container first, then a leading-`@` token heuristic over the container's
//! raw text. Partial data beats data loss; only a record with no usable
//! identity key is dropped.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::browser::{ElementHandle, PageDriver};
use crate::core::Record;
use crate::locator::{self, site};

/// Normalize a raw handle token into the dedup identity key: trimmed,
/// leading `@` stripped, lowercased. Empty after normalization → `None`.
pub fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim().trim_start_matches('@').trim().to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn handle_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9._]+)").expect("valid handle pattern"))
}

/// Pull an identity key out of free text, e.g. a virtualized row's full
/// `inner_text` when the structured sub-locators all missed.
pub fn key_from_text(text: &str) -> Option<String> {
    handle_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| normalize_key(m.as_str()))
}

/// Canonical profile URL: prefer the row's own link resolved against the
/// site origin, otherwise derive from the identity key.
fn canonical_profile(base_url: &str, href: Option<&str>, key: &str) -> String {
    if let Some(href) = href {
        if let Ok(base) = Url::parse(base_url) {
            if let Ok(joined) = base.join(href) {
                return joined.to_string();
            }
        }
    }
    format!("{}/@{}", base_url.trim_end_matches('/'), key)
}

// ── Accumulator ──────────────────────────────────────────────────────────────

/// Insertion-ordered `username → Record` set. Grows monotonically within a
/// run; never shrinks, never overwrites.
#[derive(Debug, Default)]
pub struct Accumulator {
    index: HashMap<String, usize>,
    records: Vec<Record>,
    dropped: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records dropped for lacking a usable identity key.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Merge-if-absent. Returns `true` when the record was new. A record
    /// with an empty key cannot be deduplicated or addressed and is dropped.
    pub fn insert(&mut self, record: Record) -> bool {
        if record.username.is_empty() {
            self.dropped += 1;
            debug!("dropping record with empty identity key");
            return false;
        }
        if self.index.contains_key(&record.username) {
            return false;
        }
        self.index.insert(record.username.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

// ── Extraction pass ──────────────────────────────────────────────────────────

/// One extraction pass over the currently visible record containers.
/// Returns how many records were appended. Per-element failures are
/// recovered here and never propagate.
pub async fn extract_pass(
    driver: &dyn PageDriver,
    base_url: &str,
    acc: &mut Accumulator,
) -> usize {
    let containers = locator::resolve_all(driver, &site::RECORD_CONTAINER).await;
    let mut appended = 0;
    for container in containers {
        match extract_one(driver, base_url, container).await {
            Some(record) => {
                if acc.insert(record) {
                    appended += 1;
                }
            }
            None => {
                acc.dropped += 1;
                debug!("record element skipped: no usable identity key");
            }
        }
    }
    appended
}

async fn extract_one(
    driver: &dyn PageDriver,
    base_url: &str,
    container: ElementHandle,
) -> Option<Record> {
    // Structured extraction: dedicated sub-locators inside the row.
    let structured_key = match locator::resolve_within(driver, container, &site::RECORD_USERNAME).await
    {
        Some(found) => driver
            .inner_text(found.handle)
            .await
            .ok()
            .and_then(|t| normalize_key(&t)),
        None => None,
    };

    if let Some(username) = structured_key {
        let display_name =
            match locator::resolve_within(driver, container, &site::RECORD_DISPLAY_NAME).await {
                Some(found) => driver
                    .inner_text(found.handle)
                    .await
                    .map(|t| t.trim().to_string())
                    .unwrap_or_default(),
                None => String::new(),
            };
        let href = match locator::resolve_within(driver, container, &site::RECORD_LINK).await {
            Some(found) => driver.attribute(found.handle, "href").await.ok().flatten(),
            None => None,
        };
        let profile_ref = canonical_profile(base_url, href.as_deref(), &username);
        return Some(Record {
            username,
            display_name,
            profile_ref,
        });
    }

    // Heuristic fallback: fish the handle token out of the row's raw text.
    let text = driver.inner_text(container).await.ok()?;
    let username = key_from_text(&text)?;
    let profile_ref = canonical_profile(base_url, None, &username);
    Some(Record {
        username,
        display_name: String::new(),
        profile_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ScriptedDriver, ScriptedElement};

    const BASE: &str = "https://www.tiktok.com";

    fn record(key: &str, name: &str) -> Record {
        Record {
            username: key.into(),
            display_name: name.into(),
            profile_ref: format!("{BASE}/@{key}"),
        }
    }

    #[test]
    fn keys_normalize_to_lowercase_without_at() {
        assert_eq!(normalize_key(" @CoolCat99 "), Some("coolcat99".into()));
        assert_eq!(normalize_key("alice"), Some("alice".into()));
        assert_eq!(normalize_key("@"), None);
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn heuristic_finds_leading_at_token_in_noise() {
        let text = "Follow\n@CoolCat99\nCool Cat · 1.2M followers";
        assert_eq!(key_from_text(text), Some("coolcat99".into()));
        assert_eq!(key_from_text("no handle here"), None);
    }

    #[test]
    fn first_seen_wins_on_duplicate_keys() {
        let mut acc = Accumulator::new();
        assert!(acc.insert(record("a", "")));
        assert!(!acc.insert(record("a", "Alice")));
        assert_eq!(acc.len(), 1);
        // The richer later record must not overwrite the first one.
        assert_eq!(acc.records()[0].display_name, "");
    }

    #[test]
    fn accumulator_preserves_insertion_order() {
        let mut acc = Accumulator::new();
        for key in ["c", "a", "b", "a"] {
            acc.insert(record(key, ""));
        }
        let order: Vec<&str> = acc.records().iter().map(|r| r.username.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    fn structured_row(key: &str, name: &str) -> ScriptedElement {
        ScriptedElement::new(["div[data-e2e='follow-item']"])
            .child(ScriptedElement::new(["p[data-e2e='follow-user-id']"]).text(format!("@{key}")))
            .child(ScriptedElement::new(["span[data-e2e='follow-nickname']"]).text(name))
            .child(
                ScriptedElement::new(["a[data-e2e='follow-user-avatar']"])
                    .attr("href", format!("/@{key}")),
            )
    }

    #[tokio::test]
    async fn extraction_is_idempotent_across_passes() {
        let d = ScriptedDriver::new();
        d.install(vec![
            structured_row("alice", "Alice"),
            structured_row("bob", "Bob"),
        ])
        .await;

        let mut acc = Accumulator::new();
        assert_eq!(extract_pass(&d, BASE, &mut acc).await, 2);
        // Same visible rows again: pure no-op.
        assert_eq!(extract_pass(&d, BASE, &mut acc).await, 0);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.records()[0].username, "alice");
        assert_eq!(acc.records()[0].profile_ref, format!("{BASE}/@alice"));
    }

    #[tokio::test]
    async fn heuristic_fallback_rescues_rows_without_structured_fields() {
        let d = ScriptedDriver::new();
        d.install(vec![
            // Redesigned row: none of the structured sub-locators match.
            ScriptedElement::new(["div[data-e2e='follow-item']"])
                .text("Follow\n@driftwood\nDrift Wood"),
            // Garbage row: no key at all. Dropped, not fatal.
            ScriptedElement::new(["div[data-e2e='follow-item']"]).text("Suggested for you"),
        ])
        .await;

        let mut acc = Accumulator::new();
        assert_eq!(extract_pass(&d, BASE, &mut acc).await, 1);
        assert_eq!(acc.records()[0].username, "driftwood");
        assert_eq!(acc.records()[0].display_name, "");
        assert_eq!(acc.dropped(), 1);
    }

    #[tokio::test]
    async fn profile_refs_are_canonicalized_against_the_origin() {
        let d = ScriptedDriver::new();
        d.install(vec![structured_row("carol", "Carol")]).await;

        let mut acc = Accumulator::new();
        extract_pass(&d, BASE, &mut acc).await;
        assert_eq!(acc.records()[0].profile_ref, "https://www.tiktok.com/@carol");
    }
}
