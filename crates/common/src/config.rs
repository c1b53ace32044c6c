//! Configuration management for the Application Master.
//!
//! Loads `am.*`, `task.*`, `vertex.*`, and `heartbeat-*` keys from an
//! optional `config.toml` plus `AM__`-prefixed environment variables, the
//! same two-source load order the teacher's `Config::load` uses.

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub am: AmConfig,
    pub task: TaskConfig,
    pub vertex: VertexConfig,
    pub heartbeat: HeartbeatConfig,
    pub observability: ObservabilityConfig,
}

/// `am.*` keys.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AmConfig {
    /// `am.task-listener.threads` — RPC handler pool size.
    #[serde(rename = "task-listener.threads")]
    pub task_listener_threads: usize,
    /// `am.profile-containers` — comma list of `ContainerId.id` values.
    #[serde(rename = "profile-containers")]
    pub profile_containers: Vec<u64>,
    /// `am.profile-jvm-opts` — JVM-opt string appended for profiled containers.
    #[serde(rename = "profile-jvm-opts")]
    pub profile_jvm_opts: String,
}

impl Default for AmConfig {
    fn default() -> Self {
        Self {
            task_listener_threads: 8,
            profile_containers: Vec::new(),
            profile_jvm_opts: String::new(),
        }
    }
}

/// `task.*` keys.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TaskConfig {
    /// `task.max-attempts`, default 4.
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { max_attempts: 4 }
    }
}

/// `vertex.*` keys.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct VertexConfig {
    /// `vertex.failure-tolerance`, fraction in `[0, 1]` of tasks that may
    /// fail without failing the vertex. Default 0.0 (no tolerance).
    #[serde(rename = "failure-tolerance")]
    pub failure_tolerance: f64,
}

impl Default for VertexConfig {
    fn default() -> Self {
        Self { failure_tolerance: 0.0 }
    }
}

/// `heartbeat-*` keys.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct HeartbeatConfig {
    #[serde(rename = "heartbeat-interval-ms")]
    pub interval_ms: u64,
    #[serde(rename = "heartbeat-timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, timeout_ms: 30_000 }
    }
}

/// Observability settings — ambient, not named by the spec, carried the
/// way the teacher carries them regardless of feature non-goals.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            am: AmConfig::default(),
            task: TaskConfig::default(),
            vertex: VertexConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `config.toml` (if present) layered under
    /// `AM__`-prefixed environment variables, with the defaults above as
    /// the floor.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("am.task-listener.threads", defaults.am.task_listener_threads as i64)?
            .set_default("am.profile-containers", Vec::<String>::new())?
            .set_default("am.profile-jvm-opts", defaults.am.profile_jvm_opts)?
            .set_default("task.max-attempts", defaults.task.max_attempts as i64)?
            .set_default("vertex.failure-tolerance", defaults.vertex.failure_tolerance)?
            .set_default("heartbeat.heartbeat-interval-ms", defaults.heartbeat.interval_ms as i64)?
            .set_default("heartbeat.heartbeat-timeout-ms", defaults.heartbeat.timeout_ms as i64)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.metrics_enabled", defaults.observability.metrics_enabled)?
            .set_default("observability.metrics_port", defaults.observability.metrics_port as i64)?;

        if Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("AM").separator("__").try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate cross-field invariants not already enforced by types.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.vertex.failure_tolerance) {
            errors.push("vertex.failure-tolerance must be between 0.0 and 1.0".to_string());
        }
        if self.task.max_attempts == 0 {
            errors.push("task.max-attempts must be at least 1".to_string());
        }
        if self.heartbeat.timeout_ms <= self.heartbeat.interval_ms {
            errors.push("heartbeat-timeout-ms must exceed heartbeat-interval-ms".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn bad_failure_tolerance_is_rejected() {
        let mut cfg = Config::default();
        cfg.vertex.failure_tolerance = 1.5;
        assert!(cfg.validate().is_err());
    }
}
