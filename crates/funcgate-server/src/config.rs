//! Gateway configuration.
//!
//! One `GatewayConfig` is built at startup (defaults plus cli overrides plus
//! the process-environment snapshot) and threaded into every created worker.
//! Nothing in the gateway reads the process environment ad hoc per request.

use std::path::PathBuf;

use crate::worker::{ModuleSource, WorkerSpec};
use funcgate_common::{GatewayError, Result};

/// Static defaults plus startup overrides for every worker the gateway
/// creates.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Fixed base directory combined with the function identity to form the
    /// pool key.
    pub base_dir: PathBuf,
    /// Heap/allocation ceiling handed to the engine, in MiB.
    pub memory_limit_mb: u64,
    /// Bounds a context's total lifetime from creation.
    pub wall_clock_timeout_ms: u64,
    /// Crossing this retires the worker but lets in-flight work finish.
    pub cpu_time_soft_limit_ms: u64,
    /// Crossing this terminates in-flight work and the worker.
    pub cpu_time_hard_limit_ms: u64,
    /// Reuse rendered module source for unchanged script text.
    pub module_cache_enabled: bool,
    /// When true, the outbound `gateway/net` module is not installed.
    pub net_access_disabled: bool,
    /// Host context pool bound; creations beyond it fail.
    pub max_workers: usize,
    /// Process environment, snapshotted once at startup, forwarded verbatim
    /// as ordered pairs into every created context.
    pub environment: Vec<(String, String)>,
    /// Extra import aliases (alias -> module source expression) resolved for
    /// the sandbox in addition to the builtin ones.
    pub import_alias_table: Vec<(String, String)>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("services"),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: false,
            max_workers: 64,
            environment: Vec::new(),
            import_alias_table: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_environment(mut self, environment: Vec<(String, String)>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_limits(
        mut self,
        memory_limit_mb: u64,
        wall_clock_timeout_ms: u64,
        cpu_time_soft_limit_ms: u64,
        cpu_time_hard_limit_ms: u64,
    ) -> Self {
        self.memory_limit_mb = memory_limit_mb;
        self.wall_clock_timeout_ms = wall_clock_timeout_ms;
        self.cpu_time_soft_limit_ms = cpu_time_soft_limit_ms;
        self.cpu_time_hard_limit_ms = cpu_time_hard_limit_ms;
        self
    }

    /// Rejects configurations no worker spec could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(GatewayError::Validation(
                "max_workers must be greater than zero".into(),
            ));
        }
        // The per-worker invariants (soft <= hard etc.) are enforced again at
        // creation time; checking here fails fast at startup.
        self.worker_spec(String::new(), String::new(), false)
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))
    }

    /// Builds the per-request worker spec from the static defaults and the
    /// synthesized inline module source.
    pub fn worker_spec(
        &self,
        pool_key: String,
        module_source: String,
        force_create: bool,
    ) -> WorkerSpec {
        WorkerSpec {
            function_identity: pool_key,
            memory_limit_mb: self.memory_limit_mb,
            wall_clock_timeout_ms: self.wall_clock_timeout_ms,
            cpu_time_soft_limit_ms: self.cpu_time_soft_limit_ms,
            cpu_time_hard_limit_ms: self.cpu_time_hard_limit_ms,
            module_cache_enabled: self.module_cache_enabled,
            net_access_disabled: self.net_access_disabled,
            import_alias_table: self.import_alias_table.clone(),
            environment: self.environment.clone(),
            force_create,
            module_source: ModuleSource::Inline(module_source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_cpu_limits_fail_validation() {
        let config = GatewayConfig::default().with_limits(128, 60_000, 2_000, 1_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_workers_fails_validation() {
        let mut config = GatewayConfig::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn worker_spec_inherits_defaults() {
        let config = GatewayConfig::default()
            .with_environment(vec![("REGION".into(), "eu-west-1".into())]);
        let spec = config.worker_spec("services/double".into(), "// module".into(), true);
        assert_eq!(spec.function_identity, "services/double");
        assert_eq!(spec.memory_limit_mb, 128);
        assert!(spec.force_create);
        assert_eq!(spec.environment, vec![("REGION".into(), "eu-west-1".into())]);
    }
}
