use serde::{Deserialize, Serialize};

use super::error::HarvestError;

/// Which roster of the target account to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Following,
    Followers,
}

impl ListKind {
    /// URL path segment for direct navigation to the roster surface.
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Followers => "followers",
        }
    }
}

impl std::str::FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "following" => Ok(Self::Following),
            "followers" | "fans" => Ok(Self::Followers),
            other => Err(format!("unknown list kind '{other}'")),
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// One harvested identity. `username` is the dedup key — normalized
/// (trimmed, leading `@` stripped, lowercased) before insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub profile_ref: String,
}

/// How a run ended. `BudgetExhausted` is a soft success: the list may simply
/// be longer than the round budget, so the harvested set is still valid.
#[derive(Debug)]
pub enum RunOutcome {
    /// Stagnation threshold reached — the list stopped growing.
    EndOfList,
    /// Round budget spent before the list stopped growing.
    BudgetExhausted,
    /// Session- or run-level failure. Records harvested before the failure
    /// are preserved in the report.
    Failed(HarvestError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::EndOfList | Self::BudgetExhausted)
    }
}

/// Final result of one harvest run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub records: Vec<Record>,
    pub rounds: usize,
    /// Where the records were written, when the outcome warranted writing.
    pub output: Option<std::path::PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_camel_case() {
        let r = Record {
            username: "alice".into(),
            display_name: "Alice".into(),
            profile_ref: "https://www.tiktok.com/@alice".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["displayName"], "Alice");
        assert_eq!(json["profileRef"], "https://www.tiktok.com/@alice");
    }

    #[test]
    fn list_kind_parses_aliases() {
        assert_eq!("following".parse::<ListKind>().unwrap(), ListKind::Following);
        assert_eq!("Followers".parse::<ListKind>().unwrap(), ListKind::Followers);
        assert_eq!("fans".parse::<ListKind>().unwrap(), ListKind::Followers);
        assert!("friends".parse::<ListKind>().is_err());
    }
}
