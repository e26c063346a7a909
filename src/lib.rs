pub mod browser;
pub mod core;
pub mod diagnostics;
pub mod harvest;
pub mod locator;
pub mod pagination;
pub mod persist;
pub mod runner;
pub mod session;

// --- Primary core exports ---
pub use core::{
    CaptchaMode, HarvestConfig, HarvestError, ListKind, Record, RunOutcome, RunReport,
};
