//! RevGuard Server
//!
//! HTTP policy validator for review moderation. Wraps the policy engine
//! with fail-closed request handling, a hash-chained decision audit log
//! and Prometheus metrics.

pub mod config;
pub mod routes;
pub mod state;

pub use config::{AuditConfig, ConfigOverrides, ServerConfig};
pub use routes::{create_router, AppError};
pub use state::AppState;
