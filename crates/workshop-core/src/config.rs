//! Engine configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file,
//! `WORKSHOP_*` environment variables, then whatever the caller overrides
//! (the CLI applies its flags last).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use workshop_state::RetentionPolicy;

use crate::role_orchestration::executor::ExecutionLimits;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do with a request when every workflow slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Wait for a free slot.
    #[default]
    Queue,
    /// Fail the workflow immediately.
    Reject,
}

impl FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(AdmissionPolicy::Queue),
            "reject" => Ok(AdmissionPolicy::Reject),
            other => Err(format!("unknown admission policy: {other}")),
        }
    }
}

/// Runtime settings for a `WorkflowEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_call_depth: u32,
    pub max_delegations: u32,
    pub max_turns_per_role: u32,
    pub max_rework_cycles: u32,
    /// Whole-workflow deadline.
    pub deadline_ms: u64,
    /// Per-call timeout for external capabilities.
    pub capability_timeout_ms: u64,
    pub max_concurrent_workflows: usize,
    pub admission: AdmissionPolicy,
    pub retention: RetentionPolicy,
    /// Evicted records are written here when set.
    pub archive_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            max_call_depth: limits.max_call_depth,
            max_delegations: limits.max_delegations,
            max_turns_per_role: limits.max_turns_per_role,
            max_rework_cycles: 3,
            deadline_ms: 120_000,
            capability_timeout_ms: 30_000,
            max_concurrent_workflows: 5,
            admission: AdmissionPolicy::Queue,
            retention: RetentionPolicy::default(),
            archive_dir: None,
        }
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

impl EngineConfig {
    /// Parse TOML; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay `WORKSHOP_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay `WORKSHOP_*` variables resolved through `lookup`.
    ///
    /// `WORKSHOP_RETENTION_TTL_SECS` and `WORKSHOP_RETENTION_MAX_RECORDS`
    /// accept `none` to disable that phase.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! overlay {
            ($var:literal, $field:expr) => {
                if let Some(value) = lookup($var) {
                    $field = parse_env($var, &value)?;
                }
            };
        }

        overlay!("WORKSHOP_MAX_CALL_DEPTH", self.max_call_depth);
        overlay!("WORKSHOP_MAX_DELEGATIONS", self.max_delegations);
        overlay!("WORKSHOP_MAX_TURNS_PER_ROLE", self.max_turns_per_role);
        overlay!("WORKSHOP_MAX_REWORK_CYCLES", self.max_rework_cycles);
        overlay!("WORKSHOP_DEADLINE_MS", self.deadline_ms);
        overlay!("WORKSHOP_CAPABILITY_TIMEOUT_MS", self.capability_timeout_ms);
        overlay!("WORKSHOP_MAX_CONCURRENT_WORKFLOWS", self.max_concurrent_workflows);

        if let Some(value) = lookup("WORKSHOP_ADMISSION") {
            self.admission = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "WORKSHOP_ADMISSION".into(),
                value,
            })?;
        }
        if let Some(value) = lookup("WORKSHOP_RETENTION_TTL_SECS") {
            self.retention.ttl_secs = match value.trim() {
                "none" => None,
                v => Some(parse_env("WORKSHOP_RETENTION_TTL_SECS", v)?),
            };
        }
        if let Some(value) = lookup("WORKSHOP_RETENTION_MAX_RECORDS") {
            self.retention.max_records = match value.trim() {
                "none" => None,
                v => Some(parse_env("WORKSHOP_RETENTION_MAX_RECORDS", v)?),
            };
        }
        if let Some(value) = lookup("WORKSHOP_ARCHIVE_DIR") {
            self.archive_dir = (!value.trim().is_empty()).then(|| PathBuf::from(value));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_workflows == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_workflows must be at least 1".into(),
            ));
        }
        if self.max_turns_per_role == 0 {
            return Err(ConfigError::Invalid(
                "max_turns_per_role must be at least 1".into(),
            ));
        }
        if self.deadline_ms == 0 {
            return Err(ConfigError::Invalid("deadline_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_call_depth: self.max_call_depth,
            max_delegations: self.max_delegations,
            max_turns_per_role: self.max_turns_per_role,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }
}
