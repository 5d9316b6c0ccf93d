//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use revguard_policy::PolicyEngine;
use revguard_telemetry::{AuditEvent, AuditLog, MetricsCollector};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::ServerConfig;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PolicyEngine>,

    /// `None` when auditing is disabled
    pub audit: Option<Arc<Mutex<AuditLog>>>,

    pub metrics: MetricsCollector,

    /// Renders `/metrics` when a Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// State around an engine with an in-memory audit log
    pub fn new(engine: PolicyEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            audit: Some(Arc::new(Mutex::new(AuditLog::in_memory()))),
            metrics: MetricsCollector::new(),
            prometheus: None,
        }
    }

    /// Build the engine and audit log described by `config`
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let engine = match &config.rules_path {
            Some(path) => {
                info!(path = %path.display(), "Loading rule table");
                PolicyEngine::from_file(path)?
            }
            None => PolicyEngine::new(),
        };

        let audit = if !config.audit.enabled {
            info!("Decision auditing disabled");
            None
        } else if let Some(path) = &config.audit.path {
            Some(AuditLog::open(path)?)
        } else {
            Some(AuditLog::in_memory())
        };

        Ok(Self::new(engine).with_audit(audit))
    }

    pub fn with_audit(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit.map(|log| Arc::new(Mutex::new(log)));
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Append an event to the audit log.
    ///
    /// Returns the stored event's ID. Failures are logged and counted
    /// but never change the decision being audited.
    pub fn record_audit(&self, event: AuditEvent) -> Option<String> {
        let audit = self.audit.as_ref()?;

        match audit.lock().append(event) {
            Ok(stored) => Some(stored.audit_id),
            Err(e) => {
                error!(error = %e, "Failed to append audit event");
                self.metrics.record_internal_error("audit_failure");
                None
            }
        }
    }
}
