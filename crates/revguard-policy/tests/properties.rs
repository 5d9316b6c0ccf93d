//! Property tests for the policy engine over the default rule table

use proptest::prelude::*;
use revguard_core::{ComplianceMode, Decision, PolicyContext, ScoreSet, SummaryStats};
use revguard_policy::{PolicyEngine, PolicyReason, PolicyResult, RuleTable, MAX_EXCLUSION_RATE};
use std::collections::HashMap;

const REGIONS: [&str; 3] = ["eu-west-1", "us-east-1", "ap-southeast-1"];
const CATEGORIES: [&str; 4] = ["children_toys", "healthcare", "electronics", "books"];

fn score() -> impl Strategy<Value = f64> {
    (0u32..=1000).prop_map(|n| n as f64 / 100.0)
}

fn score_set() -> impl Strategy<Value = ScoreSet> {
    (score(), score(), score()).prop_map(|(t, b, h)| ScoreSet::new(t, b, h).unwrap())
}

fn mode() -> impl Strategy<Value = ComplianceMode> {
    prop::sample::select(ComplianceMode::ALL.to_vec())
}

fn context() -> impl Strategy<Value = PolicyContext> {
    (
        prop::sample::select(REGIONS.to_vec()),
        prop::sample::select(CATEGORIES.to_vec()),
        mode(),
    )
        .prop_map(|(region, category, mode)| {
            PolicyContext::new(region, category).with_compliance_mode(mode)
        })
}

fn counts(result: &PolicyResult) -> HashMap<PolicyReason, usize> {
    let mut counts = HashMap::new();
    for reason in result.violations() {
        *counts.entry(*reason).or_insert(0) += 1;
    }
    counts
}

/// Every violation in `small` also appears in `large`, at least as often
fn is_submultiset(small: &PolicyResult, large: &PolicyResult) -> bool {
    let large = counts(large);
    counts(small)
        .into_iter()
        .all(|(reason, n)| large.get(&reason).copied().unwrap_or(0) >= n)
}

/// Violations counted directly from the default table
fn expected_violations(scores: &ScoreSet, ctx: &PolicyContext) -> usize {
    let table = RuleTable::default();
    let (t, b, h) = (scores.toxicity(), scores.bias(), scores.hallucination());
    let over = |score: f64, cap: Option<f64>| cap.is_some_and(|cap| score > cap);

    let base = table.thresholds(ctx.compliance_mode);
    let mut checks = vec![
        over(t, Some(base.toxicity)),
        over(b, Some(base.bias)),
        over(h, Some(base.hallucination)),
    ];
    if let Some(caps) = table.regional(&ctx.region) {
        checks.extend([over(t, caps.max_toxicity), over(b, caps.max_bias)]);
    }
    if let Some(caps) = table.category(&ctx.product_category) {
        checks.extend([
            over(t, caps.max_toxicity),
            over(b, caps.max_bias),
            over(h, caps.max_hallucination),
        ]);
    }

    checks.into_iter().filter(|violated| *violated).count()
}

proptest! {
    #[test]
    fn deny_iff_violations(scores in score_set(), ctx in context()) {
        let result = PolicyEngine::new().evaluate_content_policy(&scores, &ctx);

        prop_assert_eq!(result.violations().count(), expected_violations(&scores, &ctx));
        prop_assert_eq!(result.is_denied(), expected_violations(&scores, &ctx) > 0);

        match result.decision {
            Decision::Allow => prop_assert_eq!(result.reasons, vec![PolicyReason::Approved]),
            Decision::Deny => {
                prop_assert!(!result.reasons.is_empty());
                prop_assert!(result.reasons.iter().all(PolicyReason::is_violation));
            }
        }
    }

    #[test]
    fn evaluation_is_deterministic(scores in score_set(), ctx in context()) {
        let engine = PolicyEngine::new();
        let first = engine.evaluate_content_policy(&scores, &ctx);
        let second = engine.evaluate_content_policy(&scores, &ctx);

        prop_assert_eq!(first, second);
    }

    #[test]
    fn raising_a_score_never_removes_violations(
        scores in score_set(),
        bump in (score(), score(), score()),
        ctx in context(),
    ) {
        let engine = PolicyEngine::new();
        let raised = ScoreSet::new(
            scores.toxicity() + bump.0,
            scores.bias() + bump.1,
            scores.hallucination() + bump.2,
        )
        .unwrap();

        let low = engine.evaluate_content_policy(&scores, &ctx);
        let high = engine.evaluate_content_policy(&raised, &ctx);

        prop_assert!(is_submultiset(&low, &high));
        if low.is_denied() {
            prop_assert!(high.is_denied());
        }
    }

    #[test]
    fn stricter_modes_never_remove_violations(scores in score_set(), ctx in context()) {
        let engine = PolicyEngine::new();
        let with_mode = |mode| {
            engine.evaluate_content_policy(&scores, &ctx.clone().with_compliance_mode(mode))
        };

        let mild = with_mode(ComplianceMode::Mild);
        let standard = with_mode(ComplianceMode::Standard);
        let strict = with_mode(ComplianceMode::Strict);

        prop_assert!(is_submultiset(&mild, &standard));
        prop_assert!(is_submultiset(&standard, &strict));
    }

    #[test]
    fn score_at_threshold_is_compliant(mode in mode()) {
        let engine = PolicyEngine::new();
        let thresholds = engine.snapshot().table.thresholds(mode);
        let scores =
            ScoreSet::new(thresholds.toxicity, thresholds.bias, thresholds.hallucination).unwrap();
        let ctx = PolicyContext::new("ap-southeast-1", "books").with_compliance_mode(mode);

        prop_assert!(engine.evaluate_content_policy(&scores, &ctx).is_allowed());
    }

    #[test]
    fn score_above_threshold_violates(mode in mode(), epsilon in 0.001f64..1.0) {
        let engine = PolicyEngine::new();
        let thresholds = engine.snapshot().table.thresholds(mode);
        let scores = ScoreSet::new(
            thresholds.toxicity + epsilon,
            thresholds.bias + epsilon,
            thresholds.hallucination + epsilon,
        )
        .unwrap();
        let ctx = PolicyContext::new("ap-southeast-1", "books").with_compliance_mode(mode);

        let result = engine.evaluate_content_policy(&scores, &ctx);
        prop_assert_eq!(
            result.reasons,
            vec![
                PolicyReason::ToxicityThreshold,
                PolicyReason::BiasThreshold,
                PolicyReason::HallucinationThreshold,
            ]
        );
    }

    #[test]
    fn unknown_region_and_category_only_apply_base_thresholds(
        scores in score_set(),
        mode in mode(),
        suffix in "[a-z]{4,12}",
    ) {
        let engine = PolicyEngine::new();
        let ctx = PolicyContext::new(format!("zz-{}-1", suffix), format!("zz_{}", suffix))
            .with_compliance_mode(mode);
        let result = engine.evaluate_content_policy(&scores, &ctx);

        prop_assert!(result.reasons.iter().all(|r| !matches!(
            r,
            PolicyReason::RegionalCompliance | PolicyReason::CategoryRestriction
        )));
    }

    #[test]
    fn summary_decision_follows_limits(
        total in 0u64..500,
        excluded_pct in 0u64..=100,
        quality in prop::option::of(score()),
    ) {
        let excluded = total * excluded_pct / 100;
        let mut stats = SummaryStats::new(excluded, total);
        if let Some(quality) = quality {
            stats = stats.with_quality_score(quality).unwrap();
        }

        let ctx = PolicyContext::new("us-east-1", "electronics");
        let result = PolicyEngine::new().evaluate_summary_policy(&stats, &ctx);

        let expect_deny = stats.exclusion_rate() > MAX_EXCLUSION_RATE
            || quality.map_or(false, |q| q < 5.0);
        prop_assert_eq!(result.is_denied(), expect_deny);
    }
}
