//! Hash-chained audit trail of policy decisions

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use revguard_core::Decision;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// How long audit records are retained
pub const RETENTION_YEARS: i64 = 7;

/// Audit trail with hash-chained events for tamper detection.
///
/// A trail may start from an `anchor`, the head hash of an earlier
/// chain it continues. A bounded trail keeps only a window of recent
/// events and moves its anchor forward as older ones are released.
pub struct AuditTrail {
    events: Vec<AuditEvent>,
    anchor: Option<String>,
    chain_hash: Option<String>,
    capacity: Option<usize>,
}

impl AuditTrail {
    /// Create a new, empty audit trail
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            anchor: None,
            chain_hash: None,
            capacity: None,
        }
    }

    /// Create a trail that keeps fewer than `2 * capacity` events,
    /// releasing the oldest `capacity` at a time
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Create a trail continuing a chain whose head is `head`
    pub fn resume(head: Option<String>) -> Self {
        Self {
            anchor: head.clone(),
            chain_hash: head,
            ..Self::new()
        }
    }

    /// Chain an event onto the trail and keep it
    pub fn add_event(&mut self, event: AuditEvent) -> &AuditEvent {
        let event = self.chain_event(event);
        self.events.push(event);

        if let Some(capacity) = self.capacity {
            if self.events.len() >= capacity * 2 {
                self.anchor = self.events[capacity - 1].hash.clone();
                self.events.drain(..capacity);
            }
        }

        &self.events[self.events.len() - 1]
    }

    /// Link an event to the current head and advance the head.
    ///
    /// The event is returned rather than kept.
    pub fn chain_event(&mut self, mut event: AuditEvent) -> AuditEvent {
        event.previous_hash = self.chain_hash.clone();

        let hash = compute_hash(&event);
        event.hash = Some(hash.clone());

        self.chain_hash = Some(hash);
        event
    }

    /// Verify the integrity of the kept events
    pub fn verify(&self) -> bool {
        verify_chain_from(self.anchor.as_deref(), &self.events)
    }

    /// Hash the first kept event links to
    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Get all kept events
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Hash of the most recently chained event
    pub fn head(&self) -> Option<&str> {
        self.chain_hash.as_deref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a complete chain starting from the genesis event
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    verify_chain_from(None, events)
}

/// Verify events continuing a chain whose head was `anchor`
pub fn verify_chain_from(anchor: Option<&str>, events: &[AuditEvent]) -> bool {
    let mut prev_hash = anchor.map(str::to_string);

    for event in events {
        if event.previous_hash != prev_hash {
            return false;
        }

        let computed_hash = compute_hash(event);
        if event.hash.as_ref() != Some(&computed_hash) {
            return false;
        }

        prev_hash = event.hash.clone();
    }

    true
}

/// SHA-256 over every field except `hash`
fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();

    let mut field = |bytes: &[u8]| {
        hasher.update(bytes);
        hasher.update(b"\x1f");
    };

    field(event.audit_id.as_bytes());
    field(event.event_type.as_str().as_bytes());
    field(event.review_id.as_deref().unwrap_or_default().as_bytes());
    field(event.product_id.as_deref().unwrap_or_default().as_bytes());
    field(event.region.as_deref().unwrap_or_default().as_bytes());
    field(
        event
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    field(event.decision.map(|d| d.as_str()).unwrap_or_default().as_bytes());
    field(event.reasons.join(",").as_bytes());
    field(event.data.as_deref().unwrap_or_default().as_bytes());
    field(event.severity.as_str().as_bytes());
    field(event.ttl.to_string().as_bytes());
    field(event.previous_hash.as_deref().unwrap_or_default().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Analysis,
    PolicyDecision,
    PolicyUpdate,
    SummaryGenerated,
    PiiDetection,
    Error,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "ANALYSIS",
            Self::PolicyDecision => "POLICY_DECISION",
            Self::PolicyUpdate => "POLICY_UPDATE",
            Self::SummaryGenerated => "SUMMARY_GENERATED",
            Self::PiiDetection => "PII_DETECTION",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit event in the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID (`audit-<uuid>`)
    pub audit_id: String,

    pub event_type: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Policy decision, for decision events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Reason tags attached to the decision
    #[serde(default)]
    pub reasons: Vec<String>,

    /// Event payload (JSON serialized)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    pub severity: AuditSeverity,

    /// Expiry as Unix seconds
    pub ttl: i64,

    /// Hash of this event
    pub hash: Option<String>,

    /// Hash of previous event (for chaining)
    pub previous_hash: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event stamped with the current time
    pub fn new(event_type: EventType) -> Self {
        let timestamp = Utc::now();
        Self {
            audit_id: format!("audit-{}", uuid::Uuid::new_v4()),
            event_type,
            review_id: None,
            product_id: None,
            region: None,
            timestamp,
            decision: None,
            reasons: Vec::new(),
            data: None,
            severity: AuditSeverity::Info,
            ttl: (timestamp + Duration::days(365 * RETENTION_YEARS)).timestamp(),
            hash: None,
            previous_hash: None,
        }
    }

    pub fn with_review_id(mut self, review_id: impl Into<String>) -> Self {
        self.review_id = Some(review_id.into());
        self
    }

    pub fn with_product_id(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the decision; denials are raised to warning severity
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        if decision == Decision::Deny && self.severity < AuditSeverity::Warning {
            self.severity = AuditSeverity::Warning;
        }
        self
    }

    pub fn with_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons = reasons.into_iter().map(Into::into).collect();
        self
    }

    /// Set event data
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_string(&data).ok();
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}
