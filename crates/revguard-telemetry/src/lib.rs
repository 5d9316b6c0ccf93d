//! RevGuard Telemetry
//!
//! Audit and metrics for policy decisions.
//!
//! Provides:
//! - A SHA-256 hash-chained audit trail of every decision
//! - Append-only JSON-lines persistence that resumes an existing chain
//!   and survives torn writes
//! - Decision counters and latency, mirrored to the `metrics` facade

pub mod audit;
pub mod metrics;
pub mod persistence;

pub use audit::{
    verify_chain, verify_chain_from, AuditEvent, AuditSeverity, AuditTrail, EventType,
};
pub use metrics::{EvaluationKind, MetricsCollector, MetricsSnapshot};
pub use persistence::{
    read_file, verify_events, AuditCheckpoint, AuditLog, ChainReport, MEMORY_WINDOW,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditSeverity, AuditTrail, EventType};
    pub use crate::metrics::{EvaluationKind, MetricsCollector};
    pub use crate::persistence::AuditLog;
}
