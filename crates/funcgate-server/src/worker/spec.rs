//! Worker specifications.

use funcgate_common::{GatewayError, Result};

/// Where a context's module code comes from.
///
/// The gateway core always synthesizes inline source; the other variants
/// exist for hosts that deploy prebuilt bundles or on-disk entrypoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Complete module source text, evaluated as-is.
    Inline(String),
    /// A prebuilt code bundle.
    PrecompiledBundle(Vec<u8>),
    /// Path to an entrypoint file resolved at creation time.
    FileEntrypoint(std::path::PathBuf),
}

/// Everything needed to create one sandboxed context.
///
/// Built per request from [`GatewayConfig`](crate::config::GatewayConfig)
/// defaults; `function_identity` here is the full pool key (base dir plus the
/// URL identity segment).
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub function_identity: String,
    pub memory_limit_mb: u64,
    pub wall_clock_timeout_ms: u64,
    pub cpu_time_soft_limit_ms: u64,
    pub cpu_time_hard_limit_ms: u64,
    pub module_cache_enabled: bool,
    pub net_access_disabled: bool,
    /// Alias -> module source expression, evaluated once at creation.
    pub import_alias_table: Vec<(String, String)>,
    /// Environment pairs exposed through `gateway/kit`.
    pub environment: Vec<(String, String)>,
    /// Discard any pooled context for this identity and start fresh.
    pub force_create: bool,
    pub module_source: ModuleSource,
}

impl WorkerSpec {
    /// Rejects specs no context can be created from. Called before any engine
    /// work so a bad spec never costs a context slot.
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_mb == 0 {
            return Err(GatewayError::WorkerCreation(
                "memory limit must be greater than zero".into(),
            ));
        }
        if self.wall_clock_timeout_ms == 0 {
            return Err(GatewayError::WorkerCreation(
                "wall-clock timeout must be greater than zero".into(),
            ));
        }
        if self.cpu_time_soft_limit_ms > self.cpu_time_hard_limit_ms {
            return Err(GatewayError::WorkerCreation(format!(
                "cpu soft limit ({}ms) exceeds hard limit ({}ms)",
                self.cpu_time_soft_limit_ms, self.cpu_time_hard_limit_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: false,
            import_alias_table: Vec::new(),
            environment: Vec::new(),
            force_create: false,
            module_source: ModuleSource::Inline(String::new()),
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn soft_limit_above_hard_limit_is_rejected() {
        let mut s = spec();
        s.cpu_time_soft_limit_ms = 3_000;
        let err = s.validate().unwrap_err();
        assert!(matches!(err, GatewayError::WorkerCreation(_)));
        assert!(err.to_string().contains("soft limit"));
    }

    #[test]
    fn equal_soft_and_hard_limits_pass() {
        let mut s = spec();
        s.cpu_time_soft_limit_ms = 2_000;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut s = spec();
        s.memory_limit_mb = 0;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.wall_clock_timeout_ms = 0;
        assert!(s.validate().is_err());
    }
}
