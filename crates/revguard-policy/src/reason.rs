//! Violation reason taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag identifying which rule layer or metric was breached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyReason {
    #[serde(rename = "TOXICITY_THRESHOLD_EXCEEDED")]
    ToxicityThreshold,

    #[serde(rename = "BIAS_THRESHOLD_EXCEEDED")]
    BiasThreshold,

    #[serde(rename = "HALLUCINATION_THRESHOLD_EXCEEDED")]
    HallucinationThreshold,

    #[serde(rename = "REGIONAL_COMPLIANCE_VIOLATION")]
    RegionalCompliance,

    #[serde(rename = "CATEGORY_RESTRICTION_VIOLATION")]
    CategoryRestriction,

    /// Too many reviews were dropped before summarization
    #[serde(rename = "HIGH_EXCLUSION_RATE")]
    HighExclusionRate,

    /// Summary quality score below the floor
    #[serde(rename = "LOW_SUMMARY_QUALITY")]
    LowSummaryQuality,

    #[serde(rename = "CONTENT_APPROVED")]
    Approved,
}

impl PolicyReason {
    /// Wire tag of this reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToxicityThreshold => "TOXICITY_THRESHOLD_EXCEEDED",
            Self::BiasThreshold => "BIAS_THRESHOLD_EXCEEDED",
            Self::HallucinationThreshold => "HALLUCINATION_THRESHOLD_EXCEEDED",
            Self::RegionalCompliance => "REGIONAL_COMPLIANCE_VIOLATION",
            Self::CategoryRestriction => "CATEGORY_RESTRICTION_VIOLATION",
            Self::HighExclusionRate => "HIGH_EXCLUSION_RATE",
            Self::LowSummaryQuality => "LOW_SUMMARY_QUALITY",
            Self::Approved => "CONTENT_APPROVED",
        }
    }

    /// Reason as it appeared in the older taxonomy, which reported the
    /// summary checks under the regional and hallucination tags.
    pub fn legacy(&self) -> PolicyReason {
        match self {
            Self::HighExclusionRate => Self::RegionalCompliance,
            Self::LowSummaryQuality => Self::HallucinationThreshold,
            other => *other,
        }
    }

    /// Whether this reason marks a violation
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Approved)
    }
}

impl fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
