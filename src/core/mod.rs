pub mod config;
pub mod error;
pub mod types;

pub use config::{CaptchaMode, HarvestConfig};
pub use error::HarvestError;
pub use types::{ListKind, Record, RunOutcome, RunReport};
