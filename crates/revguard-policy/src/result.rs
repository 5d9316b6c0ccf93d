//! Policy evaluation results

use revguard_core::{Decision, PolicyContext};
use serde::{Deserialize, Serialize};

use crate::rules::{CategoryOverride, RegionalOverride, Thresholds};
use crate::PolicyReason;

/// Result of evaluating content or a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    /// ALLOW or DENY
    pub decision: Decision,

    /// Violated rules in evaluation order, or `[CONTENT_APPROVED]`
    pub reasons: Vec<PolicyReason>,

    /// Human-readable summary of the decision
    pub explanation: String,

    /// Echo of inputs and thresholds for audit reproducibility
    pub metadata: PolicyMetadata,
}

impl PolicyResult {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.decision == Decision::Deny
    }

    /// Wire tags of the reasons, in order
    pub fn reason_tags(&self) -> Vec<&'static str> {
        self.reasons.iter().map(PolicyReason::as_str).collect()
    }

    /// Reasons that mark violations (empty when allowed)
    pub fn violations(&self) -> impl Iterator<Item = &PolicyReason> {
        self.reasons.iter().filter(|r| r.is_violation())
    }
}

/// Inputs and thresholds that produced a [`PolicyResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyMetadata {
    /// Content evaluation
    Content {
        toxicity_score: f64,
        bias_score: f64,
        hallucination_score: f64,

        /// Base thresholds for the context's compliance mode
        thresholds_applied: Thresholds,

        /// Regional caps, if the region has an override
        #[serde(skip_serializing_if = "Option::is_none")]
        regional_override: Option<RegionalOverride>,

        /// Category caps, if the category has an override
        #[serde(skip_serializing_if = "Option::is_none")]
        category_override: Option<CategoryOverride>,

        context: PolicyContext,

        /// Rule table revision the evaluation ran against
        rule_revision: u64,
    },

    /// Summary evaluation
    Summary {
        exclusion_rate: f64,
        quality_score: f64,
        reviews_excluded: u64,
        total_reviews: u64,
        context: PolicyContext,
        rule_revision: u64,
    },
}

impl PolicyMetadata {
    pub fn context(&self) -> &PolicyContext {
        match self {
            Self::Content { context, .. } | Self::Summary { context, .. } => context,
        }
    }

    pub fn rule_revision(&self) -> u64 {
        match self {
            Self::Content { rule_revision, .. } | Self::Summary { rule_revision, .. } => {
                *rule_revision
            }
        }
    }
}
