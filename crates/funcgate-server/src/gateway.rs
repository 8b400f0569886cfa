//! Invocation gateway.
//!
//! Ties the pipeline together: validate the identity, synthesize (or fetch
//! the cached) module source, acquire a pooled worker and dispatch. Every
//! failure along the way collapses into one deterministic
//! [`InvocationResult`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::config::GatewayConfig;
use crate::synthesizer::render_module;
use crate::worker::{dispatch, CancellationSignal, WorkerPool};
use funcgate_common::{GatewayError, InvocationRequest, InvocationResult, Result};

/// Rendered module source cached per pool key, invalidated whenever the
/// script text changes.
struct CachedModule {
    script: String,
    source: String,
}

pub struct Gateway {
    config: GatewayConfig,
    pool: WorkerPool,
    module_cache: Mutex<HashMap<String, CachedModule>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            pool: WorkerPool::new(config.max_workers),
            module_cache: Mutex::new(HashMap::new()),
            config,
        }))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handles one invocation end to end. Never fails: pre-dispatch errors
    /// are rendered into the result with their taxonomy status.
    pub async fn handle_invocation(&self, request: InvocationRequest) -> InvocationResult {
        match self.invoke(request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "invocation rejected before dispatch");
                InvocationResult::from_error(&err)
            }
        }
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult> {
        validate_identity(&request.function_identity)?;
        let pool_key = self.pool_key(&request.function_identity);

        let source = self.module_source(&pool_key, &request.script).await?;
        let spec = self
            .config
            .worker_spec(pool_key, source, request.force_create);

        let worker = self.pool.acquire(spec).await?;

        let payload = json!({ "args": request.args });
        let signal = CancellationSignal::new();
        Ok(dispatch(worker, payload, signal).await)
    }

    /// Base directory plus identity; the only key workers are pooled under.
    fn pool_key(&self, identity: &str) -> String {
        format!("{}/{}", self.config.base_dir.display(), identity)
    }

    /// Renders the sandbox module for `script`, reusing the cached render
    /// when caching is on and the script text is unchanged.
    async fn module_source(&self, pool_key: &str, script: &str) -> Result<String> {
        let extra_aliases: Vec<String> = self
            .config
            .import_alias_table
            .iter()
            .map(|(alias, _)| alias.clone())
            .collect();

        if !self.config.module_cache_enabled {
            return Ok(render_module(script, &extra_aliases)?.into_source());
        }

        let mut cache = self.module_cache.lock().await;
        if let Some(cached) = cache.get(pool_key) {
            if cached.script == script {
                return Ok(cached.source.clone());
            }
        }

        let source = render_module(script, &extra_aliases)?.into_source();
        cache.insert(
            pool_key.to_string(),
            CachedModule {
                script: script.to_string(),
                source: source.clone(),
            },
        );
        Ok(source)
    }
}

/// Validates a function identity taken from the URL path.
///
/// Empty identities get the canonical missing-name message; separator and
/// traversal characters are rejected so an identity can never escape the
/// base directory in the pool key.
pub fn validate_identity(identity: &str) -> Result<()> {
    if identity.is_empty() {
        return Err(GatewayError::Validation(
            "missing function name in request".into(),
        ));
    }
    if identity.contains("..")
        || identity.contains('/')
        || identity.contains('\\')
        || identity.contains('\0')
    {
        return Err(GatewayError::Validation(
            "invalid function name in request".into(),
        ));
    }
    Ok(())
}
