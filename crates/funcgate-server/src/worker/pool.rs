//! Worker lifecycle and pooling.
//!
//! A `Worker` is one sandbox context plus its lifecycle state: creation
//! instant (the wall-clock anchor), the accumulated CPU counter and the
//! retired flag. The pool keys live workers by function identity so repeat
//! invocations reuse a warm context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::runtime::context::{Execution, ExecutionBudget, SandboxContext};
use crate::worker::{CancellationSignal, WorkerSpec};
use funcgate_common::{GatewayError, Result};

/// One pooled sandbox context.
#[derive(Debug)]
pub struct Worker {
    spec: WorkerSpec,
    context: SandboxContext,
    created_at: Instant,
    retired: AtomicBool,
    /// Nanoseconds of CPU time across all invocations this context served.
    cpu_time_used: AtomicU64,
}

impl Worker {
    pub(crate) fn create(spec: WorkerSpec) -> Result<Arc<Self>> {
        spec.validate()?;
        let context = SandboxContext::new(&spec)?;
        Ok(Arc::new(Self {
            spec,
            context,
            created_at: Instant::now(),
            retired: AtomicBool::new(false),
            cpu_time_used: AtomicU64::new(0),
        }))
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    /// A retired worker never serves another invocation; the pool replaces
    /// it lazily on the next acquire.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Wall-clock bound, anchored at creation rather than per invocation.
    pub fn wall_deadline(&self) -> Instant {
        self.created_at + Duration::from_millis(self.spec.wall_clock_timeout_ms)
    }

    pub fn cpu_time_used(&self) -> Duration {
        Duration::from_nanos(self.cpu_time_used.load(Ordering::SeqCst))
    }

    /// Runs one invocation against this worker's context under its budget.
    pub(crate) fn run(&self, payload: &JsonValue, signal: &CancellationSignal) -> Execution {
        let budget = ExecutionBudget {
            signal,
            wall_deadline: self.wall_deadline(),
            cpu_soft: Duration::from_millis(self.spec.cpu_time_soft_limit_ms),
            cpu_hard: Duration::from_millis(self.spec.cpu_time_hard_limit_ms),
            cpu_used: &self.cpu_time_used,
        };
        self.context.execute(payload, &budget)
    }
}

/// Keyed pool of live workers, bounded by `max_workers`.
pub struct WorkerPool {
    workers: Mutex<HashMap<String, Arc<Worker>>>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            max_workers,
        }
    }

    /// Returns the pooled worker for the spec's identity, creating one when
    /// there is none, the pooled one is retired, or the spec forces a fresh
    /// context.
    ///
    /// The pool lock is held across creation: concurrent requests for the
    /// same identity resolve to one creation, not a stampede of contexts.
    pub async fn acquire(&self, spec: WorkerSpec) -> Result<Arc<Worker>> {
        let mut workers = self.workers.lock().await;

        if let Some(existing) = workers.get(&spec.function_identity) {
            if !spec.force_create && !existing.is_retired() {
                return Ok(Arc::clone(existing));
            }
        }

        // Replacing a retired or force-discarded entry does not grow the
        // pool, so it is exempt from the bound.
        let replacing = workers.contains_key(&spec.function_identity);
        if !replacing && workers.len() >= self.max_workers {
            return Err(GatewayError::WorkerCreation(format!(
                "context pool exhausted ({} live contexts)",
                self.max_workers
            )));
        }

        let key = spec.function_identity.clone();
        tracing::debug!(identity = %key, "creating sandbox context");

        // Module evaluation is engine-bound work; keep it off the async
        // executor.
        let worker = tokio::task::spawn_blocking(move || Worker::create(spec))
            .await
            .map_err(|e| {
                GatewayError::WorkerCreation(format!("context creation task failed: {}", e))
            })??;

        workers.insert(key, Arc::clone(&worker));
        Ok(worker)
    }

    pub async fn live_workers(&self) -> usize {
        self.workers.lock().await.len()
    }
}
