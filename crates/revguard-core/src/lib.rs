//! RevGuard Core
//!
//! Core types and error handling shared across RevGuard components.
//!
//! This crate provides:
//! - Analyzer score sets and the request context a policy is evaluated in
//! - Summary statistics fed to the summary gate
//! - The ALLOW/DENY decision type
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ComplianceMode, Decision, PolicyContext, ScoreSet, SummaryStats};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ComplianceMode, Decision, PolicyContext, ScoreSet, SummaryStats};
}
