//! Dispatch executor.
//!
//! `dispatch` is the single choke point between the HTTP layer and the
//! sandbox: every invocation enters here exactly once and leaves with
//! exactly one terminal [`InvocationResult`]. Classification happens here
//! and nowhere downstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;

use crate::runtime::context::ExecOutcome;
use crate::worker::Worker;
use funcgate_common::InvocationResult;

/// Externally firable cancellation flag, checked at dispatch entry and at
/// every execution slice. Once fired it never resets.
#[derive(Clone, Debug, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one invocation on `worker` and classifies the outcome.
///
/// The sandbox call itself is synchronous engine work and runs on a
/// blocking thread; this future stays poll-friendly for the server.
pub async fn dispatch(
    worker: Arc<Worker>,
    payload: JsonValue,
    signal: CancellationSignal,
) -> InvocationResult {
    if signal.is_fired() {
        return InvocationResult::cancelled("cancellation signal fired before dispatch");
    }
    if Instant::now() >= worker.wall_deadline() {
        worker.retire();
        return InvocationResult::cancelled("wall-clock limit exceeded");
    }

    let identity = worker.spec().function_identity.clone();
    let started = Instant::now();

    let task_worker = Arc::clone(&worker);
    let execution =
        match tokio::task::spawn_blocking(move || task_worker.run(&payload, &signal)).await {
            Ok(execution) => execution,
            Err(e) => {
                // A panic may have poisoned the context lock; never reuse it.
                worker.retire();
                return InvocationResult::failed(format!("sandbox execution task failed: {}", e));
            }
        };

    if execution.cpu_soft_exceeded && !worker.is_retired() {
        tracing::warn!(
            identity = %identity,
            "cpu soft limit exceeded, retiring context after this invocation"
        );
        worker.retire();
    }

    match execution.outcome {
        ExecOutcome::Reply(body) => {
            tracing::info!(
                identity = %identity,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "invocation completed"
            );
            InvocationResult::completed(200, body)
        }
        ExecOutcome::Preempted(reason) => {
            worker.retire();
            tracing::warn!(identity = %identity, reason = %reason, "invocation cancelled");
            InvocationResult::cancelled(reason)
        }
        ExecOutcome::Failed(msg) => {
            tracing::error!(identity = %identity, error = %msg, "invocation failed");
            InvocationResult::failed(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::render_module;
    use crate::worker::{ModuleSource, WorkerSpec};
    use funcgate_common::Outcome;
    use serde_json::json;

    fn worker_for(script: &str, wall_clock_timeout_ms: u64) -> Arc<Worker> {
        let module = render_module(script, &[]).unwrap();
        let spec = WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: true,
            import_alias_table: Vec::new(),
            environment: Vec::new(),
            force_create: false,
            module_source: ModuleSource::Inline(module.into_source()),
        };
        Worker::create(spec).unwrap()
    }

    #[tokio::test]
    async fn completed_invocation_forwards_the_reply() {
        let worker = worker_for("respond().json({ x: args.x * 2 }).send();", 60_000);
        let result = dispatch(
            worker,
            json!({ "args": { "x": 5 } }),
            CancellationSignal::new(),
        )
        .await;

        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.http_status, 200);
        assert_eq!(result.body["status"], "ok");
        assert_eq!(result.body["results"][0]["body"]["x"], 10);
    }

    #[tokio::test]
    async fn script_error_is_a_completed_error_reply() {
        // The wrapper absorbs the throw; outcome-wise the invocation
        // completed and the reply says so.
        let worker = worker_for("throw new Error('boom');", 60_000);
        let result = dispatch(worker, json!({ "args": {} }), CancellationSignal::new()).await;

        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.body["status"], "error");
    }

    #[tokio::test]
    async fn pre_fired_signal_cancels_before_dispatch() {
        let worker = worker_for("respond().send();", 60_000);
        let signal = CancellationSignal::new();
        signal.fire();

        let result = dispatch(Arc::clone(&worker), json!({ "args": {} }), signal).await;
        assert_eq!(result.outcome, Outcome::Cancelled);
        assert_eq!(result.http_status, 500);
        // The signal, not the worker, was at fault.
        assert!(!worker.is_retired());
    }

    #[tokio::test]
    async fn expired_wall_clock_cancels_and_retires() {
        let worker = worker_for("respond().send();", 1);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let result = dispatch(
            Arc::clone(&worker),
            json!({ "args": {} }),
            CancellationSignal::new(),
        )
        .await;

        assert_eq!(result.outcome, Outcome::Cancelled);
        assert!(worker.is_retired());
    }
}
