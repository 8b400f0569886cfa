//! Sandboxed Boa context.
//!
//! One `SandboxContext` wraps one engine context evaluated from a
//! synthesized module. Execution is synchronous and metered: the `__handle`
//! promise is polled between bounded job slices so wall-clock, CPU and
//! cancellation checks run on the host's schedule, not the script's.

use boa_engine::{
    builtins::promise::PromiseState, js_string, object::builtins::JsPromise, value::JsValue,
    Context, Source,
};
use serde_json::Value as JsonValue;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::runtime::{
    bindings,
    conversions::{json_to_js_value, js_value_to_json},
    job_pump::JobPump,
};
use crate::worker::{CancellationSignal, ModuleSource, WorkerSpec};
use funcgate_common::{GatewayError, Result};

/// Execution limits for one invocation, plus the shared CPU accumulator.
///
/// `cpu_used` belongs to the worker, not the invocation: CPU time accrues
/// across every invocation served by the same context, so a reused context
/// can cross a limit on work a previous request started.
pub struct ExecutionBudget<'a> {
    pub signal: &'a CancellationSignal,
    pub wall_deadline: Instant,
    pub cpu_soft: Duration,
    pub cpu_hard: Duration,
    pub cpu_used: &'a AtomicU64,
}

/// Terminal state of one metered execution.
#[derive(Debug)]
pub enum ExecOutcome {
    /// The handler settled; its reply object, converted to JSON.
    Reply(JsonValue),
    /// The host stopped the execution (limits or cancellation signal). The
    /// context must not serve further invocations.
    Preempted(String),
    /// Anything else that kept the handler from producing a reply.
    Failed(String),
}

#[derive(Debug)]
pub struct Execution {
    pub outcome: ExecOutcome,
    /// The soft CPU limit was crossed; the reply (if any) still stands but
    /// the context should be retired afterwards.
    pub cpu_soft_exceeded: bool,
}

impl Execution {
    fn failed(msg: impl Into<String>) -> Self {
        Self {
            outcome: ExecOutcome::Failed(msg.into()),
            cpu_soft_exceeded: false,
        }
    }
}

/// Boa context wrapper holding an evaluated sandbox module.
pub struct SandboxContext {
    ctx: Mutex<Context>,
    pump: Rc<JobPump>,
}

impl std::fmt::Debug for SandboxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxContext").finish_non_exhaustive()
    }
}

/// # Safety
///
/// Boa's `Context` (and the `Rc<JobPump>` registered into it) is not thread
/// safe on its own. All access here goes through the `Mutex`: `execute` is
/// the only entrypoint, it locks for its full duration, and no method leaks
/// a reference past the lock. The pump is only touched while the same lock
/// is held, so the `Rc` is never shared across threads concurrently.
unsafe impl Send for SandboxContext {}

/// # Safety
///
/// See the `Send` impl: every path into the inner context acquires the
/// mutex, which serializes all use of the engine and the job pump.
unsafe impl Sync for SandboxContext {}

impl SandboxContext {
    /// Creates a context, applies the spec's engine limits, installs the
    /// gateway bindings and evaluates the module. Fails if the module does
    /// not install a callable `__handle` entrypoint.
    pub fn new(spec: &WorkerSpec) -> Result<Self> {
        let pump = Rc::new(JobPump::new());
        let mut ctx = Context::builder()
            .job_executor(pump.clone())
            .build()
            .map_err(|e| {
                GatewayError::WorkerCreation(format!("engine context creation failed: {}", e))
            })?;

        apply_runtime_limits(&mut ctx, spec);
        bindings::install_gateway_bindings(&mut ctx, spec)?;

        let source = match &spec.module_source {
            ModuleSource::Inline(source) => source,
            ModuleSource::PrecompiledBundle(_) | ModuleSource::FileEntrypoint(_) => {
                return Err(GatewayError::WorkerCreation(
                    "only inline module sources are supported by this host".into(),
                ));
            }
        };

        ctx.eval(Source::from_bytes(source)).map_err(|e| {
            GatewayError::WorkerCreation(format!("module evaluation failed: {}", e))
        })?;

        let handle = ctx
            .global_object()
            .get(js_string!("__handle"), &mut ctx)
            .map_err(|e| GatewayError::WorkerCreation(e.to_string()))?;
        if !handle.as_object().map_or(false, |o| o.is_callable()) {
            return Err(GatewayError::WorkerCreation(
                "module did not install a callable __handle entrypoint".into(),
            ));
        }

        Ok(Self {
            ctx: Mutex::new(ctx),
            pump,
        })
    }

    /// Calls `__handle(payload)` and pumps the job queue until the returned
    /// promise settles or the budget stops it.
    ///
    /// A synchronous stretch of script cannot be interrupted mid-flight; the
    /// budget is enforced at slice boundaries, and the engine's own loop
    /// iteration limit bounds how long one stretch can run.
    pub fn execute(&self, payload: &JsonValue, budget: &ExecutionBudget<'_>) -> Execution {
        let mut ctx = match self.ctx.lock() {
            Ok(guard) => guard,
            Err(_) => return Execution::failed("sandbox context poisoned by a previous panic"),
        };

        let handle = match ctx.global_object().get(js_string!("__handle"), &mut ctx) {
            Ok(value) => value,
            Err(e) => return Execution::failed(format!("entrypoint lookup failed: {}", e)),
        };
        let handle = match handle.as_object() {
            Some(obj) => obj.clone(),
            None => return Execution::failed("entrypoint is not callable"),
        };

        let js_payload = match json_to_js_value(payload.clone(), &mut ctx) {
            Ok(value) => value,
            Err(e) => return Execution::failed(format!("payload conversion failed: {}", e)),
        };

        let mut soft_exceeded = false;

        let call_started = Instant::now();
        let called = handle.call(&JsValue::undefined(), &[js_payload], &mut ctx);
        let used = add_cpu(budget.cpu_used, call_started.elapsed());

        let value = match called {
            Ok(value) => value,
            Err(e) => {
                // A loop-iteration-limit abort lands here; if the budget is
                // spent, classify it as preemption rather than script error.
                if used >= budget.cpu_hard {
                    return Execution {
                        outcome: ExecOutcome::Preempted("cpu hard limit exceeded".into()),
                        cpu_soft_exceeded: soft_exceeded,
                    };
                }
                return Execution::failed(format!("handler invocation failed: {}", e));
            }
        };

        if used >= budget.cpu_hard {
            return Execution {
                outcome: ExecOutcome::Preempted("cpu hard limit exceeded".into()),
                cpu_soft_exceeded: soft_exceeded,
            };
        }
        if used >= budget.cpu_soft {
            soft_exceeded = true;
        }

        let promise_obj = match value.as_object() {
            Some(obj) => obj.clone(),
            None => return Execution::failed("handler did not return a promise"),
        };
        let promise = match JsPromise::from_object(promise_obj) {
            Ok(promise) => promise,
            Err(_) => return Execution::failed("handler did not return a promise"),
        };

        loop {
            match promise.state() {
                PromiseState::Fulfilled(value) => {
                    return match js_value_to_json(value, &mut ctx) {
                        Ok(json) => Execution {
                            outcome: ExecOutcome::Reply(json),
                            cpu_soft_exceeded: soft_exceeded,
                        },
                        Err(e) => Execution::failed(format!("reply conversion failed: {}", e)),
                    };
                }
                PromiseState::Rejected(err) => {
                    let msg = err
                        .to_string(&mut ctx)
                        .map(|s| s.to_std_string_escaped())
                        .unwrap_or_else(|_| "unknown rejection".into());
                    return Execution {
                        outcome: ExecOutcome::Failed(format!("handler rejected: {}", msg)),
                        cpu_soft_exceeded: soft_exceeded,
                    };
                }
                PromiseState::Pending => {}
            }

            if budget.signal.is_fired() {
                return Execution {
                    outcome: ExecOutcome::Preempted("cancellation signal fired".into()),
                    cpu_soft_exceeded: soft_exceeded,
                };
            }
            if Instant::now() >= budget.wall_deadline {
                return Execution {
                    outcome: ExecOutcome::Preempted("wall-clock limit exceeded".into()),
                    cpu_soft_exceeded: soft_exceeded,
                };
            }
            if !self.pump.has_pending_jobs() {
                // Pending promise, empty queue: nothing can ever settle it.
                return Execution {
                    outcome: ExecOutcome::Failed(
                        "handler stalled on a promise with no runnable jobs".into(),
                    ),
                    cpu_soft_exceeded: soft_exceeded,
                };
            }

            let slice_started = Instant::now();
            self.pump.drain_slice(&mut ctx);
            let used = add_cpu(budget.cpu_used, slice_started.elapsed());

            if used >= budget.cpu_hard {
                return Execution {
                    outcome: ExecOutcome::Preempted("cpu hard limit exceeded".into()),
                    cpu_soft_exceeded: soft_exceeded,
                };
            }
            if used >= budget.cpu_soft {
                soft_exceeded = true;
            }
        }
    }
}

/// Adds a slice's elapsed time to the worker's CPU accumulator and returns
/// the new total.
fn add_cpu(counter: &AtomicU64, elapsed: Duration) -> Duration {
    let nanos = elapsed.as_nanos() as u64;
    let total = counter.fetch_add(nanos, Ordering::SeqCst) + nanos;
    Duration::from_nanos(total)
}

/// Maps the spec's memory limit onto the engine's runtime limits. The engine
/// has no direct heap cap; the stack and loop iteration bounds keep runaway
/// scripts from exhausting the host between metered slices.
fn apply_runtime_limits(ctx: &mut Context, spec: &WorkerSpec) {
    let limits = ctx.runtime_limits_mut();
    limits.set_stack_size_limit((spec.memory_limit_mb as usize).saturating_mul(1024) * 128);
    limits.set_loop_iteration_limit(
        spec.cpu_time_hard_limit_ms
            .saturating_mul(100_000)
            .max(10_000_000),
    );
    limits.set_recursion_limit(2_048);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::render_module;
    use serde_json::json;

    fn context_for(script: &str) -> SandboxContext {
        let module = render_module(script, &[]).unwrap();
        let spec = WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: true,
            import_alias_table: Vec::new(),
            environment: Vec::new(),
            force_create: false,
            module_source: ModuleSource::Inline(module.into_source()),
        };
        SandboxContext::new(&spec).unwrap()
    }

    fn run(
        context: &SandboxContext,
        payload: JsonValue,
        cpu_used: &AtomicU64,
        wall_deadline: Instant,
    ) -> Execution {
        let signal = CancellationSignal::new();
        let budget = ExecutionBudget {
            signal: &signal,
            wall_deadline,
            cpu_soft: Duration::from_secs(5),
            cpu_hard: Duration::from_secs(10),
            cpu_used,
        };
        context.execute(&payload, &budget)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn reply_carries_responder_snapshots() {
        let context = context_for("respond().json({ x: args.x * 2 }).send();");
        let cpu = AtomicU64::new(0);
        let execution = run(&context, json!({ "args": { "x": 5 } }), &cpu, far_deadline());

        match execution.outcome {
            ExecOutcome::Reply(reply) => {
                assert_eq!(reply["status"], "ok");
                assert_eq!(reply["results"][0]["status"], 200);
                assert_eq!(reply["results"][0]["body"]["x"], 10);
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn thrown_script_error_is_absorbed_into_the_reply() {
        let context = context_for("throw new Error('boom');");
        let cpu = AtomicU64::new(0);
        let execution = run(&context, json!({ "args": {} }), &cpu, far_deadline());

        match execution.outcome {
            ExecOutcome::Reply(reply) => {
                assert_eq!(reply["status"], "error");
                assert!(reply["msg"].as_str().unwrap().contains("boom"));
                assert_eq!(reply["results"], json!([]));
            }
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn awaited_promises_settle_through_the_pump() {
        let context = context_for("const a = await Promise.resolve(21); respond().json({ a: a * 2 }).send();");
        let cpu = AtomicU64::new(0);
        let execution = run(&context, json!({ "args": {} }), &cpu, far_deadline());

        match execution.outcome {
            ExecOutcome::Reply(reply) => assert_eq!(reply["results"][0]["body"]["a"], 42),
            other => panic!("expected reply, got {:?}", other),
        }
    }

    #[test]
    fn global_state_persists_across_invocations() {
        let context =
            context_for("globalThis.n = (globalThis.n || 0) + 1; respond().json({ n: globalThis.n }).send();");
        let cpu = AtomicU64::new(0);

        for expected in 1..=2 {
            let execution = run(&context, json!({ "args": {} }), &cpu, far_deadline());
            match execution.outcome {
                ExecOutcome::Reply(reply) => {
                    assert_eq!(reply["results"][0]["body"]["n"], expected);
                    assert_eq!(reply["results"].as_array().unwrap().len(), 1);
                }
                other => panic!("expected reply, got {:?}", other),
            }
        }
    }

    #[test]
    fn forever_pending_promise_hits_the_wall_deadline() {
        let context = context_for("await new Promise(() => {});");
        let cpu = AtomicU64::new(0);
        let execution = run(
            &context,
            json!({ "args": {} }),
            &cpu,
            Instant::now() - Duration::from_millis(1),
        );

        assert!(matches!(execution.outcome, ExecOutcome::Preempted(_)));
    }

    #[test]
    fn forever_pending_promise_with_room_left_is_a_stall() {
        let context = context_for("await new Promise(() => {});");
        let cpu = AtomicU64::new(0);
        let execution = run(&context, json!({ "args": {} }), &cpu, far_deadline());

        match execution.outcome {
            ExecOutcome::Failed(msg) => assert!(msg.contains("stalled")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn accumulated_cpu_from_earlier_invocations_preempts() {
        let context = context_for("respond().json({ ok: true }).send();");
        // Pretend a previous invocation already burned past the hard limit.
        let cpu = AtomicU64::new(Duration::from_secs(11).as_nanos() as u64);
        let execution = run(&context, json!({ "args": {} }), &cpu, far_deadline());

        match execution.outcome {
            ExecOutcome::Preempted(reason) => assert!(reason.contains("cpu hard limit")),
            other => panic!("expected preemption, got {:?}", other),
        }
    }

    #[test]
    fn fired_signal_preempts_a_pending_handler() {
        let context = context_for("await new Promise(() => {});");
        let cpu = AtomicU64::new(0);
        let signal = CancellationSignal::new();
        signal.fire();
        let budget = ExecutionBudget {
            signal: &signal,
            wall_deadline: far_deadline(),
            cpu_soft: Duration::from_secs(5),
            cpu_hard: Duration::from_secs(10),
            cpu_used: &cpu,
        };
        let execution = context.execute(&json!({ "args": {} }), &budget);

        match execution.outcome {
            ExecOutcome::Preempted(reason) => assert!(reason.contains("cancellation")),
            other => panic!("expected preemption, got {:?}", other),
        }
    }

    #[test]
    fn bundle_sources_are_rejected() {
        let spec = WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: true,
            import_alias_table: Vec::new(),
            environment: Vec::new(),
            force_create: false,
            module_source: ModuleSource::PrecompiledBundle(vec![0, 1, 2]),
        };
        let err = SandboxContext::new(&spec).unwrap_err();
        assert!(matches!(err, GatewayError::WorkerCreation(_)));
    }

    #[test]
    fn module_without_entrypoint_fails_creation() {
        let spec = WorkerSpec {
            function_identity: "services/test".into(),
            memory_limit_mb: 128,
            wall_clock_timeout_ms: 60_000,
            cpu_time_soft_limit_ms: 1_000,
            cpu_time_hard_limit_ms: 2_000,
            module_cache_enabled: true,
            net_access_disabled: true,
            import_alias_table: Vec::new(),
            environment: Vec::new(),
            force_create: false,
            module_source: ModuleSource::Inline("const x = 1;".into()),
        };
        let err = SandboxContext::new(&spec).unwrap_err();
        assert!(matches!(err, GatewayError::WorkerCreation(_)));
    }
}
