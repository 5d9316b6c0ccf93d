//! Core types for RevGuard

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Upper bound of the analyzer's score scale
pub const MAX_SCORE: f64 = 10.0;

/// Strictness tier selecting which base threshold row applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ComplianceMode {
    Mild,
    #[default]
    Standard,
    Strict,
}

impl ComplianceMode {
    /// All modes, least strict first
    pub const ALL: [ComplianceMode; 3] = [Self::Mild, Self::Standard, Self::Strict];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mild => "mild",
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for ComplianceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mild" => Ok(Self::Mild),
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            _ => Err(Error::InvalidComplianceMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for ComplianceMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Risk scores produced by the upstream analyzer for one piece of content.
///
/// Scores are conventionally in `[0, 10]`. [`ScoreSet::new`] only rejects
/// values that are not numbers; clamping is the analyzer's job and is
/// available through [`ScoreSet::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScoreSet")]
pub struct ScoreSet {
    toxicity: f64,
    bias: f64,
    hallucination: f64,
}

#[derive(Deserialize)]
struct RawScoreSet {
    toxicity: f64,
    bias: f64,
    hallucination: f64,
}

impl TryFrom<RawScoreSet> for ScoreSet {
    type Error = Error;

    fn try_from(raw: RawScoreSet) -> Result<Self> {
        Self::new(raw.toxicity, raw.bias, raw.hallucination)
    }
}

impl ScoreSet {
    /// Create a score set, rejecting NaN and infinite scores
    pub fn new(toxicity: f64, bias: f64, hallucination: f64) -> Result<Self> {
        check_finite("toxicity", toxicity)?;
        check_finite("bias", bias)?;
        check_finite("hallucination", hallucination)?;

        Ok(Self {
            toxicity,
            bias,
            hallucination,
        })
    }

    /// Create a score set clamped to the analyzer's `[0, 10]` scale
    pub fn clamped(toxicity: f64, bias: f64, hallucination: f64) -> Result<Self> {
        let scores = Self::new(toxicity, bias, hallucination)?;
        Ok(Self {
            toxicity: scores.toxicity.clamp(0.0, MAX_SCORE),
            bias: scores.bias.clamp(0.0, MAX_SCORE),
            hallucination: scores.hallucination.clamp(0.0, MAX_SCORE),
        })
    }

    pub fn toxicity(&self) -> f64 {
        self.toxicity
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn hallucination(&self) -> f64 {
        self.hallucination
    }
}

fn check_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_score(format!("{name} score must be a finite number, got {value}")))
    }
}

/// Context a piece of content is evaluated in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Region identifier, e.g. `us-east-1`
    pub region: String,

    /// Product category identifier, e.g. `electronics`
    pub product_category: String,

    /// Strictness tier
    #[serde(default)]
    pub compliance_mode: ComplianceMode,

    /// Customer tier; carried for audit, not used by any rule layer yet
    #[serde(default = "default_user_tier")]
    pub user_tier: String,
}

impl PolicyContext {
    /// Create a context in standard mode for the standard user tier
    pub fn new(region: impl Into<String>, product_category: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            product_category: product_category.into(),
            compliance_mode: ComplianceMode::default(),
            user_tier: default_user_tier(),
        }
    }

    /// Create a context from a raw compliance mode string
    pub fn parse(
        region: impl Into<String>,
        product_category: impl Into<String>,
        compliance_mode: &str,
    ) -> Result<Self> {
        let mode = compliance_mode.parse()?;
        Ok(Self::new(region, product_category).with_compliance_mode(mode))
    }

    pub fn with_compliance_mode(mut self, mode: ComplianceMode) -> Self {
        self.compliance_mode = mode;
        self
    }

    pub fn with_user_tier(mut self, tier: impl Into<String>) -> Self {
        self.user_tier = tier.into();
        self
    }
}

fn default_user_tier() -> String {
    "standard".to_string()
}

/// Statistics of one summarization run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSummaryStats")]
pub struct SummaryStats {
    reviews_excluded: u64,
    total_reviews: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality_score: Option<f64>,
}

#[derive(Deserialize)]
struct RawSummaryStats {
    #[serde(default)]
    reviews_excluded: u64,
    #[serde(default)]
    total_reviews: u64,
    #[serde(default)]
    quality_score: Option<f64>,
}

impl TryFrom<RawSummaryStats> for SummaryStats {
    type Error = Error;

    fn try_from(raw: RawSummaryStats) -> Result<Self> {
        let stats = Self::new(raw.reviews_excluded, raw.total_reviews);
        match raw.quality_score {
            Some(score) => stats.with_quality_score(score),
            None => Ok(stats),
        }
    }
}

impl SummaryStats {
    /// Quality score assumed when the summarizer reported none
    pub const DEFAULT_QUALITY_SCORE: f64 = 10.0;

    pub fn new(reviews_excluded: u64, total_reviews: u64) -> Self {
        Self {
            reviews_excluded,
            total_reviews,
            quality_score: None,
        }
    }

    /// Attach a quality score, rejecting values that are not numbers
    pub fn with_quality_score(mut self, score: f64) -> Result<Self> {
        check_finite("quality", score)?;
        self.quality_score = Some(score);
        Ok(self)
    }

    pub fn reviews_excluded(&self) -> u64 {
        self.reviews_excluded
    }

    pub fn total_reviews(&self) -> u64 {
        self.total_reviews
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.quality_score
    }

    /// Quality score with the high default applied when none was reported
    pub fn effective_quality_score(&self) -> f64 {
        self.quality_score.unwrap_or(Self::DEFAULT_QUALITY_SCORE)
    }

    /// Fraction of reviews excluded; zero when there were no reviews
    pub fn exclusion_rate(&self) -> f64 {
        if self.total_reviews == 0 {
            0.0
        } else {
            self.reviews_excluded as f64 / self.total_reviews as f64
        }
    }
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
