//! Server configuration

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix (`REVGUARD__PORT`, `REVGUARD__AUDIT__PATH`)
pub const ENV_PREFIX: &str = "REVGUARD";

/// Policy validator service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,

    /// Listen port
    pub port: u16,

    /// YAML rule table merged over the default rules at startup
    pub rules_path: Option<PathBuf>,

    /// Maximum request body size in bytes
    pub max_body_bytes: usize,

    /// Decision audit log
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            rules_path: None,
            max_body_bytes: default_max_body_bytes(),
            audit: AuditConfig::default(),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record every decision
    pub enabled: bool,

    /// JSONL file to append to; events stay in memory when unset
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Command-line values that take precedence over file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub rules_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub no_audit: bool,
}

impl ServerConfig {
    /// Load configuration from an optional YAML file, then `REVGUARD__*`
    /// environment variables, then command-line overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();

        let mut config: ServerConfig = Config::builder()
            .add_source(File::from(config_path).format(FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply(overrides);
        Ok(config)
    }

    /// Apply command-line overrides
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.listen = listen.clone();
        }

        if let Some(port) = overrides.port {
            self.port = port;
        }

        if let Some(rules_path) = &overrides.rules_path {
            self.rules_path = Some(rules_path.clone());
        }

        if let Some(audit_path) = &overrides.audit_path {
            self.audit.path = Some(audit_path.clone());
        }

        if overrides.no_audit {
            self.audit.enabled = false;
        }
    }

    /// `listen:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    1024 * 1024 // 1 MiB
}
