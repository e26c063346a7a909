//! Typed failure taxonomy for a harvest run.
//!
//! Per-element extraction failures never appear here — those are recovered
//! locally (heuristic fallback or skip) inside `harvest`. Budget exhaustion
//! is likewise not an error: it is a normal `RunOutcome`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("missing required environment variable {0}")]
    MissingConfig(&'static str),

    #[error("no candidate selector matched for mandatory element '{what}'")]
    LocatorUnresolved { what: &'static str },

    #[error("captcha checkpoint not cleared within {waited_secs}s")]
    CaptchaTimeout { waited_secs: u64 },

    #[error("login control still present after submission — credentials rejected")]
    CredentialsRejected,

    #[error("timed out waiting for {what}")]
    NavigationTimeout { what: &'static str },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Short machine-friendly tag used in diagnostics records and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingConfig(_) => "missing_config",
            Self::LocatorUnresolved { .. } => "locator_unresolved",
            Self::CaptchaTimeout { .. } => "captcha_timeout",
            Self::CredentialsRejected => "credentials_rejected",
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::Browser(_) => "browser",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings_name_the_failure() {
        let e = HarvestError::LocatorUnresolved {
            what: "password input",
        };
        assert!(e.to_string().contains("password input"));

        let e = HarvestError::CaptchaTimeout { waited_secs: 60 };
        assert!(e.to_string().contains("60"));
        assert_eq!(e.kind(), "captcha_timeout");
    }
}
