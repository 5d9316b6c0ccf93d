//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use revguard_core::{Decision, PolicyContext, ScoreSet, SummaryStats};
use revguard_policy::{PolicyResult, PolicySummary, UpdateOutcome};
use revguard_telemetry::{AuditEvent, ChainReport, EvaluationKind, EventType, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::state::AppState;

/// Score assumed for any metric the analyzer did not report
pub const MISSING_SCORE: f64 = 10.0;

/// Reason tag returned when a request could not be evaluated
pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/stats", get(stats))
        .route("/v1/validate/content", post(validate_content))
        .route("/v1/validate/summary", post(validate_summary))
        .route("/v1/policies", get(get_policies).patch(update_policies))
        .route("/v1/audit/verify", get(verify_audit))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

async fn stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Policy context as sent by callers; the mode is validated on conversion
#[derive(Debug, Deserialize)]
pub struct ContextPayload {
    pub region: String,
    pub product_category: String,
    #[serde(default)]
    pub compliance_mode: Option<String>,
    #[serde(default)]
    pub user_tier: Option<String>,
}

impl ContextPayload {
    fn into_context(self) -> revguard_core::Result<PolicyContext> {
        let mode = self.compliance_mode.as_deref().unwrap_or("standard");
        let context = PolicyContext::parse(self.region, self.product_category, mode)?;

        Ok(match self.user_tier {
            Some(tier) => context.with_user_tier(tier),
            None => context,
        })
    }
}

/// Analyzer output; absent scores fail closed at [`MISSING_SCORE`]
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisPayload {
    pub toxicity_score: Option<f64>,
    pub bias_score: Option<f64>,
    pub hallucination_score: Option<f64>,
}

impl AnalysisPayload {
    fn into_scores(self) -> revguard_core::Result<ScoreSet> {
        ScoreSet::clamped(
            self.toxicity_score.unwrap_or(MISSING_SCORE),
            self.bias_score.unwrap_or(MISSING_SCORE),
            self.hallucination_score.unwrap_or(MISSING_SCORE),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ContentValidationRequest {
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub analysis_result: AnalysisPayload,
    pub policy_context: ContextPayload,
}

#[derive(Debug, Deserialize)]
pub struct SummaryValidationRequest {
    #[serde(default)]
    pub product_id: Option<String>,
    pub summary_data: SummaryStats,
    pub policy_context: ContextPayload,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub validation_result: PolicyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

async fn validate_content(
    State(state): State<AppState>,
    payload: Result<Json<ContentValidationRequest>, JsonRejection>,
) -> Result<Json<ValidationResponse>, AppError> {
    let Json(req) = payload.map_err(|e| reject(&state, e))?;

    let context = req
        .policy_context
        .into_context()
        .map_err(|e| reject(&state, e))?;
    let scores = req
        .analysis_result
        .into_scores()
        .map_err(|e| reject(&state, e))?;

    let started = Instant::now();
    let result = state.engine.evaluate_content_policy(&scores, &context);
    state.metrics.record_evaluation(
        EvaluationKind::Content,
        result.decision,
        elapsed_us(started),
    );

    let mut event = decision_event(EventType::PolicyDecision, &context, &result);
    if let Some(review_id) = &req.review_id {
        event = event.with_review_id(review_id.as_str());
    }
    if let Some(product_id) = &req.product_id {
        event = event.with_product_id(product_id.as_str());
    }
    let audit_id = state.record_audit(event);

    Ok(Json(ValidationResponse {
        validation_result: result,
        audit_id,
    }))
}

async fn validate_summary(
    State(state): State<AppState>,
    payload: Result<Json<SummaryValidationRequest>, JsonRejection>,
) -> Result<Json<ValidationResponse>, AppError> {
    let Json(req) = payload.map_err(|e| reject(&state, e))?;

    let context = req
        .policy_context
        .into_context()
        .map_err(|e| reject(&state, e))?;

    let started = Instant::now();
    let result = state
        .engine
        .evaluate_summary_policy(&req.summary_data, &context);
    state.metrics.record_evaluation(
        EvaluationKind::Summary,
        result.decision,
        elapsed_us(started),
    );

    let mut event = decision_event(EventType::SummaryGenerated, &context, &result);
    if let Some(product_id) = &req.product_id {
        event = event.with_product_id(product_id.as_str());
    }
    let audit_id = state.record_audit(event);

    Ok(Json(ValidationResponse {
        validation_result: result,
        audit_id,
    }))
}

async fn get_policies(State(state): State<AppState>) -> Json<PolicySummary> {
    Json(state.engine.get_policy_summary())
}

async fn update_policies(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<UpdateOutcome>, AppError> {
    let Json(updates) = payload.map_err(|e| {
        state.metrics.record_rejected("invalid_update");
        AppError::InvalidRequest(e.body_text())
    })?;

    let outcome = state.engine.update_policy_thresholds(&updates).map_err(|e| {
        state.metrics.record_rejected("invalid_update");
        AppError::InvalidRequest(e.to_string())
    })?;

    if !outcome.applied.is_empty() {
        state.metrics.record_policy_update();
        let event = AuditEvent::new(EventType::PolicyUpdate).with_data(json!({
            "policy_update": {
                "applied": outcome.applied,
                "revision": outcome.revision,
            }
        }));
        state.record_audit(event);
    }

    info!(
        revision = outcome.revision,
        applied = outcome.applied.len(),
        ignored = outcome.ignored.len(),
        "Handled policy update"
    );

    Ok(Json(outcome))
}

/// Verify the audit chain. Only the checkpoint is taken under the log's
/// lock; hashing runs on the blocking pool.
async fn verify_audit(State(state): State<AppState>) -> Result<Json<ChainReport>, AppError> {
    let Some(audit) = &state.audit else {
        return Ok(Json(ChainReport {
            events: 0,
            valid: true,
        }));
    };

    let checkpoint = audit.lock().checkpoint();
    let report = tokio::task::spawn_blocking(move || checkpoint.verify())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .map_err(|e| {
            state.metrics.record_internal_error("audit_verify");
            AppError::Internal(e.to_string())
        })?;

    if !report.valid {
        warn!(events = report.events, "Audit chain failed verification");
    }

    Ok(Json(report))
}

async fn fallback() -> AppError {
    AppError::NotFound
}

fn decision_event(
    event_type: EventType,
    context: &PolicyContext,
    result: &PolicyResult,
) -> AuditEvent {
    AuditEvent::new(event_type)
        .with_region(context.region.as_str())
        .with_decision(result.decision)
        .with_reasons(result.reason_tags())
        .with_data(&result.metadata)
}

/// Count and audit a validation request that is answered fail-closed
fn reject(state: &AppState, err: impl Into<AppError>) -> AppError {
    let err = err.into();
    state.metrics.record_rejected("invalid_request");

    if let AppError::Validation(msg) = &err {
        let event = AuditEvent::new(EventType::Error)
            .with_decision(Decision::Deny)
            .with_reasons([SYSTEM_ERROR])
            .with_data(json!({ "error": msg }));
        state.record_audit(event);
    }

    err
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Errors returned by handlers
#[derive(Debug)]
pub enum AppError {
    /// A validation request that could not be evaluated; answered with a DENY
    Validation(String),
    InvalidRequest(String),
    NotFound,
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<revguard_core::Error> for AppError {
    fn from(err: revguard_core::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => {
                warn!(error = %msg, "Policy validation failed, denying");

                let body = json!({
                    "validation_result": {
                        "decision": Decision::Deny,
                        "reasons": [SYSTEM_ERROR],
                        "explanation": format!("Policy validation failed: {}", msg),
                    }
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            AppError::InvalidRequest(msg) => {
                let body = json!({
                    "error": {
                        "message": msg,
                        "type": "invalid_request_error",
                    }
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            AppError::NotFound => {
                let body = json!({
                    "error": {
                        "message": "Not found",
                        "type": "not_found",
                    }
                });
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            AppError::Internal(msg) => {
                error!(error = %msg, "Internal error");

                let body = json!({
                    "error": {
                        "message": msg,
                        "type": "internal_error",
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
