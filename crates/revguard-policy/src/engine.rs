//! Policy evaluation engine

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use revguard_core::{Decision, PolicyContext, Result, ScoreSet, SummaryStats};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::result::{PolicyMetadata, PolicyResult};
use crate::rules::{RuleTable, UpdateOutcome};
use crate::PolicyReason;

/// Version tag reported with every policy summary
pub const POLICY_VERSION: &str = "1.0.0";

/// Summaries excluding more than this fraction of reviews are denied
pub const MAX_EXCLUSION_RATE: f64 = 0.5;

/// Summaries scoring below this quality are denied
pub const MIN_SUMMARY_QUALITY: f64 = 5.0;

/// Immutable view of the rule table at one revision
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSnapshot {
    pub table: RuleTable,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Current policy configuration, for introspection and audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub policy_version: String,
    pub revision: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub policies: RuleTable,
}

/// Policy evaluation engine.
///
/// Evaluations take a snapshot of the rule table and never block on
/// each other. Updates build a new table and swap it in whole, so a
/// reader sees either the old table or the new one.
pub struct PolicyEngine {
    current: RwLock<Arc<RuleSnapshot>>,
    writer: Mutex<()>,
}

impl PolicyEngine {
    /// Create an engine with the default rule table
    pub fn new() -> Self {
        Self::with_rules(RuleTable::default())
    }

    /// Create an engine with a specific rule table
    pub fn with_rules(table: RuleTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSnapshot {
                table,
                revision: 0,
                updated_at: None,
            })),
            writer: Mutex::new(()),
        }
    }

    /// Create an engine from a YAML rule file merged over the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let table = RuleTable::from_file(path)?;
        Ok(Self::with_rules(table))
    }

    /// Current rule table snapshot
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.read().clone()
    }

    /// Evaluate analyzer scores for one piece of content
    pub fn evaluate_content_policy(
        &self,
        scores: &ScoreSet,
        context: &PolicyContext,
    ) -> PolicyResult {
        let snapshot = self.snapshot();
        let table = &snapshot.table;
        let mut violations = Violations::default();

        let (toxicity, bias, hallucination) =
            (scores.toxicity(), scores.bias(), scores.hallucination());

        // Base thresholds
        let thresholds = table.thresholds(context.compliance_mode);
        let base = [
            ("Toxicity", toxicity, thresholds.toxicity, PolicyReason::ToxicityThreshold),
            ("Bias", bias, thresholds.bias, PolicyReason::BiasThreshold),
            (
                "Hallucination",
                hallucination,
                thresholds.hallucination,
                PolicyReason::HallucinationThreshold,
            ),
        ];
        for (metric, score, threshold, reason) in base {
            if score > threshold {
                violations.push(
                    reason,
                    format!(
                        "{} score {} exceeds threshold {}",
                        metric,
                        format_score(score),
                        format_score(threshold)
                    ),
                );
            }
        }

        // Regional caps
        let regional = table.regional(&context.region).copied();
        if let Some(caps) = regional {
            for (metric, score, cap) in [
                ("toxicity", toxicity, caps.max_toxicity),
                ("bias", bias, caps.max_bias),
            ] {
                if exceeds(score, cap) {
                    violations.push(
                        PolicyReason::RegionalCompliance,
                        format!("Regional {} limit exceeded for {}", metric, context.region),
                    );
                }
            }
        }

        // Category caps
        let category = table.category(&context.product_category).copied();
        if let Some(caps) = category {
            for (metric, score, cap) in [
                ("toxicity", toxicity, caps.max_toxicity),
                ("bias", bias, caps.max_bias),
                ("hallucination", hallucination, caps.max_hallucination),
            ] {
                if exceeds(score, cap) {
                    violations.push(
                        PolicyReason::CategoryRestriction,
                        format!(
                            "Category {} limit exceeded for {}",
                            metric, context.product_category
                        ),
                    );
                }
            }
        }

        let metadata = PolicyMetadata::Content {
            toxicity_score: toxicity,
            bias_score: bias,
            hallucination_score: hallucination,
            thresholds_applied: thresholds,
            regional_override: regional,
            category_override: category,
            context: context.clone(),
            rule_revision: snapshot.revision,
        };

        let result = violations.into_result("Content", metadata);
        log_result("content", context, &result);
        result
    }

    /// Evaluate the statistics of a summarization run
    pub fn evaluate_summary_policy(
        &self,
        stats: &SummaryStats,
        context: &PolicyContext,
    ) -> PolicyResult {
        let revision = self.snapshot().revision;
        let mut violations = Violations::default();

        let exclusion_rate = stats.exclusion_rate();
        if exclusion_rate > MAX_EXCLUSION_RATE {
            violations.push(
                PolicyReason::HighExclusionRate,
                format!(
                    "High exclusion rate: {:.2}% of reviews excluded",
                    exclusion_rate * 100.0
                ),
            );
        }

        let quality_score = stats.effective_quality_score();
        if quality_score < MIN_SUMMARY_QUALITY {
            violations.push(
                PolicyReason::LowSummaryQuality,
                format!(
                    "Summary quality score {} below threshold",
                    format_score(quality_score)
                ),
            );
        }

        let metadata = PolicyMetadata::Summary {
            exclusion_rate,
            quality_score,
            reviews_excluded: stats.reviews_excluded(),
            total_reviews: stats.total_reviews(),
            context: context.clone(),
            rule_revision: revision,
        };

        let result = violations.into_result("Summary", metadata);
        log_result("summary", context, &result);
        result
    }

    /// Shallow-merge `updates` into the rule table.
    ///
    /// All-or-nothing: the new table is built and validated off to the
    /// side and swapped in only if every recognized key applied cleanly.
    /// Unknown keys are logged and listed in [`UpdateOutcome::ignored`].
    pub fn update_policy_thresholds(&self, updates: &Map<String, Value>) -> Result<UpdateOutcome> {
        let _writer = self.writer.lock();
        let current = self.snapshot();

        let (table, mut outcome) = current.table.merged(updates).map_err(|e| {
            error!(error = %e, "Failed to update policies");
            e
        })?;

        if outcome.applied.is_empty() {
            outcome.revision = current.revision;
            return Ok(outcome);
        }

        let next = Arc::new(RuleSnapshot {
            table,
            revision: current.revision + 1,
            updated_at: Some(Utc::now()),
        });
        outcome.revision = next.revision;
        *self.current.write() = next;

        info!(
            revision = outcome.revision,
            applied = ?outcome.applied,
            ignored = ?outcome.ignored,
            "Updated policy thresholds"
        );

        Ok(outcome)
    }

    /// Snapshot of the current configuration with the policy version tag
    pub fn get_policy_summary(&self) -> PolicySummary {
        let snapshot = self.snapshot();
        PolicySummary {
            policy_version: POLICY_VERSION.to_string(),
            revision: snapshot.revision,
            last_updated: snapshot.updated_at,
            policies: snapshot.table.clone(),
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Violations accumulated across all rule layers
#[derive(Default)]
struct Violations {
    reasons: Vec<PolicyReason>,
    messages: Vec<String>,
}

impl Violations {
    fn push(&mut self, reason: PolicyReason, message: String) {
        self.reasons.push(reason);
        self.messages.push(message);
    }

    fn into_result(self, subject: &str, metadata: PolicyMetadata) -> PolicyResult {
        if self.reasons.is_empty() {
            PolicyResult {
                decision: Decision::Allow,
                reasons: vec![PolicyReason::Approved],
                explanation: format!("{} meets all policy requirements", subject),
                metadata,
            }
        } else {
            PolicyResult {
                decision: Decision::Deny,
                reasons: self.reasons,
                explanation: format!(
                    "{} policy violations: {}",
                    subject,
                    self.messages.join("; ")
                ),
                metadata,
            }
        }
    }
}

/// A missing cap never triggers
fn exceeds(score: f64, cap: Option<f64>) -> bool {
    cap.is_some_and(|cap| score > cap)
}

/// Render a score with at least one decimal place (`8.0`, `2.75`)
fn format_score(value: f64) -> String {
    format!("{:?}", value)
}

fn log_result(kind: &str, context: &PolicyContext, result: &PolicyResult) {
    debug!(
        kind = %kind,
        region = %context.region,
        category = %context.product_category,
        mode = %context.compliance_mode,
        decision = %result.decision,
        "Evaluated policy"
    );

    if result.is_denied() {
        info!(
            kind = %kind,
            region = %context.region,
            category = %context.product_category,
            reasons = ?result.reason_tags(),
            "Policy denied"
        );
    }
}
