//! Rule table definitions and shallow-merge updates

use revguard_core::{ComplianceMode, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// One threshold per compliance mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRow {
    pub mild: f64,
    pub standard: f64,
    pub strict: f64,
}

impl ThresholdRow {
    pub const fn new(mild: f64, standard: f64, strict: f64) -> Self {
        Self {
            mild,
            standard,
            strict,
        }
    }

    /// Threshold for a compliance mode
    pub fn get(&self, mode: ComplianceMode) -> f64 {
        match mode {
            ComplianceMode::Mild => self.mild,
            ComplianceMode::Standard => self.standard,
            ComplianceMode::Strict => self.strict,
        }
    }

    fn set(&mut self, mode: ComplianceMode, value: f64) {
        match mode {
            ComplianceMode::Mild => self.mild = value,
            ComplianceMode::Standard => self.standard = value,
            ComplianceMode::Strict => self.strict = value,
        }
    }
}

/// Base thresholds selected for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub toxicity: f64,
    pub bias: f64,
    pub hallucination: f64,
}

/// Per-region caps, layered on top of the base thresholds.
///
/// Hallucination has no regional cap. A missing cap never triggers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionalOverride {
    #[serde(default)]
    pub gdpr_required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_toxicity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bias: Option<f64>,
}

impl RegionalOverride {
    pub fn new(max_toxicity: f64, max_bias: f64) -> Self {
        Self {
            gdpr_required: false,
            max_toxicity: Some(max_toxicity),
            max_bias: Some(max_bias),
        }
    }

    pub fn with_gdpr(mut self) -> Self {
        self.gdpr_required = true;
        self
    }
}

/// Per-product-category caps on all three scores
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_toxicity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bias: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hallucination: Option<f64>,
}

impl CategoryOverride {
    pub fn new(max_toxicity: f64, max_bias: f64, max_hallucination: f64) -> Self {
        Self {
            max_toxicity: Some(max_toxicity),
            max_bias: Some(max_bias),
            max_hallucination: Some(max_hallucination),
        }
    }
}

trait Caps {
    fn caps(&self) -> [(&'static str, Option<f64>); 3];
}

impl Caps for RegionalOverride {
    fn caps(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("max_toxicity", self.max_toxicity),
            ("max_bias", self.max_bias),
            ("max_hallucination", None),
        ]
    }
}

impl Caps for CategoryOverride {
    fn caps(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("max_toxicity", self.max_toxicity),
            ("max_bias", self.max_bias),
            ("max_hallucination", self.max_hallucination),
        ]
    }
}

/// Complete set of thresholds and overrides the engine evaluates against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub toxicity: ThresholdRow,
    pub bias: ThresholdRow,
    pub hallucination: ThresholdRow,
    pub regional_compliance: BTreeMap<String, RegionalOverride>,
    pub category_restrictions: BTreeMap<String, CategoryOverride>,
}

impl Default for RuleTable {
    fn default() -> Self {
        let regional_compliance = BTreeMap::from([
            (
                "eu-west-1".to_string(),
                RegionalOverride::new(3.0, 2.0).with_gdpr(),
            ),
            ("us-east-1".to_string(), RegionalOverride::new(5.0, 4.0)),
        ]);

        let category_restrictions = BTreeMap::from([
            ("children_toys".to_string(), CategoryOverride::new(1.0, 1.0, 2.0)),
            ("healthcare".to_string(), CategoryOverride::new(2.0, 1.0, 1.0)),
            ("electronics".to_string(), CategoryOverride::new(5.0, 4.0, 6.0)),
        ]);

        Self {
            toxicity: ThresholdRow::new(8.0, 5.0, 3.0),
            bias: ThresholdRow::new(7.0, 4.0, 2.0),
            hallucination: ThresholdRow::new(8.0, 6.0, 4.0),
            regional_compliance,
            category_restrictions,
        }
    }
}

/// Result of applying an update to the rule table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Keys that were merged
    pub applied: Vec<String>,

    /// Unknown keys that were skipped
    pub ignored: Vec<String>,

    /// Rule table revision after the update
    pub revision: u64,
}

impl RuleTable {
    /// Base thresholds for a compliance mode
    pub fn thresholds(&self, mode: ComplianceMode) -> Thresholds {
        Thresholds {
            toxicity: self.toxicity.get(mode),
            bias: self.bias.get(mode),
            hallucination: self.hallucination.get(mode),
        }
    }

    pub fn regional(&self, region: &str) -> Option<&RegionalOverride> {
        self.regional_compliance.get(region)
    }

    pub fn category(&self, product_category: &str) -> Option<&CategoryOverride> {
        self.category_restrictions.get(product_category)
    }

    /// Shallow-merge `updates` into a copy of this table.
    ///
    /// Threshold rows merge per mode, override tables merge per region or
    /// category (an entry is replaced as a whole). Unknown top-level keys
    /// are reported in [`UpdateOutcome::ignored`]. Any malformed value fails
    /// the whole update and `self` is never touched.
    pub fn merged(&self, updates: &Map<String, Value>) -> Result<(RuleTable, UpdateOutcome)> {
        let mut next = self.clone();
        let mut outcome = UpdateOutcome::default();

        for (key, value) in updates {
            match key.as_str() {
                "toxicity" => merge_row(&mut next.toxicity, key, value)?,
                "bias" => merge_row(&mut next.bias, key, value)?,
                "hallucination" => merge_row(&mut next.hallucination, key, value)?,
                "regional_compliance" => {
                    merge_overrides(&mut next.regional_compliance, key, value)?
                }
                "category_restrictions" => {
                    merge_overrides(&mut next.category_restrictions, key, value)?
                }
                _ => {
                    warn!(policy_type = %key, "Unknown policy type in update, ignoring");
                    outcome.ignored.push(key.clone());
                    continue;
                }
            }

            debug!(policy_type = %key, update = %value, "Merged policy update");
            outcome.applied.push(key.clone());
        }

        Ok((next, outcome))
    }

    /// Load a rule table from YAML, merged over the default table
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid rule table YAML: {}", e)))?;

        let updates = match value {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(Error::config(format!(
                    "rule table must be a mapping, got {}",
                    json_kind(&other)
                )))
            }
        };

        let (table, _) = Self::default().merged(&updates)?;
        Ok(table)
    }

    /// Load a rule table from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("failed to load {}: {}", path.display(), e)))
    }
}

fn merge_row(row: &mut ThresholdRow, key: &str, value: &Value) -> Result<()> {
    let entries: BTreeMap<String, f64> = parse(key, value)?;

    for (mode, threshold) in entries {
        let mode: ComplianceMode = mode
            .parse()
            .map_err(|e| Error::config(format!("invalid '{}' update: {}", key, e)))?;
        check_limit(key, mode.as_str(), threshold)?;
        row.set(mode, threshold);
    }

    Ok(())
}

fn merge_overrides<T>(table: &mut BTreeMap<String, T>, key: &str, value: &Value) -> Result<()>
where
    T: DeserializeOwned + Caps,
{
    let entries: BTreeMap<String, T> = parse(key, value)?;

    for (name, entry) in &entries {
        for (cap, limit) in entry.caps() {
            if let Some(limit) = limit {
                check_limit(key, &format!("{}.{}", name, cap), limit)?;
            }
        }
    }

    table.extend(entries);
    Ok(())
}

fn parse<T: DeserializeOwned>(key: &str, value: &Value) -> Result<T> {
    if !value.is_object() {
        return Err(Error::config(format!(
            "invalid '{}' update: expected a mapping, got {}",
            key,
            json_kind(value)
        )));
    }

    serde_json::from_value(value.clone())
        .map_err(|e| Error::config(format!("invalid '{}' update: {}", key, e)))
}

fn check_limit(key: &str, field: &str, limit: f64) -> Result<()> {
    if limit.is_finite() && limit >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "invalid '{}' update: {} must be a non-negative number, got {}",
            key, field, limit
        )))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn updates(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_thresholds() {
        let table = RuleTable::default();

        let mild = table.thresholds(ComplianceMode::Mild);
        assert_eq!((mild.toxicity, mild.bias, mild.hallucination), (8.0, 7.0, 8.0));

        let standard = table.thresholds(ComplianceMode::Standard);
        assert_eq!(
            (standard.toxicity, standard.bias, standard.hallucination),
            (5.0, 4.0, 6.0)
        );

        let strict = table.thresholds(ComplianceMode::Strict);
        assert_eq!((strict.toxicity, strict.bias, strict.hallucination), (3.0, 2.0, 4.0));
    }

    #[test]
    fn test_default_overrides() {
        let table = RuleTable::default();

        let eu = table.regional("eu-west-1").unwrap();
        assert!(eu.gdpr_required);
        assert_eq!(eu.max_toxicity, Some(3.0));
        assert_eq!(eu.max_bias, Some(2.0));

        let toys = table.category("children_toys").unwrap();
        assert_eq!(*toys, CategoryOverride::new(1.0, 1.0, 2.0));

        assert!(table.regional("ap-southeast-1").is_none());
        assert!(table.category("books").is_none());
    }

    #[test]
    fn test_merge_threshold_row_is_shallow() {
        let table = RuleTable::default();
        let (next, outcome) = table
            .merged(&updates(json!({"toxicity": {"standard": 7.0}})))
            .unwrap();

        assert_eq!(next.toxicity, ThresholdRow::new(8.0, 7.0, 3.0));
        assert_eq!(next.bias, table.bias);
        assert_eq!(next.hallucination, table.hallucination);
        assert_eq!(outcome.applied, vec!["toxicity".to_string()]);
        assert!(outcome.ignored.is_empty());
    }

    #[test]
    fn test_merge_override_replaces_entry() {
        let table = RuleTable::default();
        let (next, _) = table
            .merged(&updates(json!({
                "regional_compliance": {"eu-west-1": {"max_toxicity": 2.5}},
                "category_restrictions": {"books": {"max_bias": 3.0}}
            })))
            .unwrap();

        let eu = next.regional("eu-west-1").unwrap();
        assert_eq!(eu.max_toxicity, Some(2.5));
        assert_eq!(eu.max_bias, None);
        assert!(!eu.gdpr_required);

        // Untouched entries survive the merge
        assert_eq!(next.regional("us-east-1"), table.regional("us-east-1"));
        assert_eq!(next.category("books").unwrap().max_bias, Some(3.0));
        assert_eq!(next.category_restrictions.len(), 4);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let table = RuleTable::default();
        let (next, outcome) = table
            .merged(&updates(json!({"profanity": {"standard": 1.0}})))
            .unwrap();

        assert_eq!(next, table);
        assert_eq!(outcome.ignored, vec!["profanity".to_string()]);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn test_malformed_update_fails_whole_merge() {
        let table = RuleTable::default();

        let cases = [
            json!({"toxicity": {"standard": "high"}}),
            json!({"toxicity": {"extreme": 1.0}}),
            json!({"bias": 4.0}),
            json!({"bias": {"strict": -1.0}}),
            json!({"regional_compliance": {"eu-west-1": {"max_toxcity": 1.0}}}),
            json!({"category_restrictions": {"books": {"max_hallucination": -2.0}}}),
        ];

        for case in cases {
            let err = table.merged(&updates(case.clone())).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "case {} gave {}", case, err);
        }
    }

    #[test]
    fn test_from_yaml_merges_over_defaults() {
        let yaml = r#"
toxicity:
  strict: 2.5
category_restrictions:
  jewelry:
    max_toxicity: 4.0
    max_bias: 3.0
    max_hallucination: 5.0
"#;

        let table = RuleTable::from_yaml(yaml).unwrap();
        assert_eq!(table.toxicity, ThresholdRow::new(8.0, 5.0, 2.5));
        assert_eq!(
            table.category("jewelry"),
            Some(&CategoryOverride::new(4.0, 3.0, 5.0))
        );
        assert!(table.category("healthcare").is_some());
    }

    #[test]
    fn test_from_yaml_empty_document() {
        assert_eq!(RuleTable::from_yaml("").unwrap(), RuleTable::default());
    }

    #[test]
    fn test_missing_rule_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent-rules.yaml");

        let err = RuleTable::from_file(&path).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
        assert!(err.to_string().contains("absent-rules.yaml"), "got {}", err);
    }

    #[test]
    fn test_from_yaml_rejects_sequence() {
        let err = RuleTable::from_yaml("- toxicity\n- bias\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
