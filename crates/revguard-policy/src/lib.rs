//! RevGuard Policy Engine
//!
//! Deterministic, layered threshold policies for review moderation.
//!
//! Content is evaluated against three independent layers, all of which
//! are always checked so the audit trail is complete:
//! - Base thresholds selected by the compliance mode
//! - Regional caps on toxicity and bias
//! - Product category caps on all three scores
//!
//! Summaries are gated on their exclusion rate and quality score.

pub mod engine;
pub mod reason;
pub mod result;
pub mod rules;

pub use engine::{
    PolicyEngine, PolicySummary, RuleSnapshot, MAX_EXCLUSION_RATE, MIN_SUMMARY_QUALITY,
    POLICY_VERSION,
};
pub use reason::PolicyReason;
pub use result::{PolicyMetadata, PolicyResult};
pub use rules::{
    CategoryOverride, RegionalOverride, RuleTable, ThresholdRow, Thresholds, UpdateOutcome,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{PolicyEngine, PolicySummary};
    pub use crate::reason::PolicyReason;
    pub use crate::result::{PolicyMetadata, PolicyResult};
    pub use crate::rules::{RuleTable, UpdateOutcome};
}
