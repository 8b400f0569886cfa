//! Job pump for Boa's promise queue.
//!
//! The sandbox awaits the `__handle` promise by alternating between checking
//! its settled state and draining one slice of queued jobs. Keeping the drain
//! granular is what lets the dispatch layer meter CPU time and enforce
//! limits between slices instead of handing the engine an unbounded turn.

use boa_engine::{
    context::Context,
    job::{GenericJob, Job, JobExecutor, NativeAsyncJob, PromiseJob},
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Queues Boa's promise, async and generic jobs and runs them in bounded
/// slices.
///
/// Uses `Rc<RefCell<_>>` interior mutability; the executor is only ever
/// touched from the thread that owns the context.
pub struct JobPump {
    promise_jobs: RefCell<VecDeque<PromiseJob>>,
    async_jobs: RefCell<VecDeque<NativeAsyncJob>>,
    generic_jobs: RefCell<VecDeque<GenericJob>>,
}

impl JobPump {
    pub fn new() -> Self {
        Self {
            promise_jobs: RefCell::default(),
            async_jobs: RefCell::default(),
            generic_jobs: RefCell::default(),
        }
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.promise_jobs.borrow().is_empty()
            || !self.async_jobs.borrow().is_empty()
            || !self.generic_jobs.borrow().is_empty()
    }

    /// Runs one slice: at most one generic job (macrotask semantics), every
    /// queued async job to completion, then all promise jobs (microtask
    /// semantics).
    ///
    /// Uncaught job errors are logged, not propagated; a rejected promise
    /// still settles and the caller observes it through the promise state.
    pub fn drain_slice(&self, context: &mut Context) {
        if let Some(generic) = self.generic_jobs.borrow_mut().pop_front() {
            if let Err(err) = generic.call(context) {
                tracing::error!("uncaught error in generic job: {err}");
            }
        }

        let async_jobs = std::mem::take(&mut *self.async_jobs.borrow_mut());
        if !async_jobs.is_empty() {
            let cell = RefCell::new(&mut *context);
            for job in async_jobs {
                if let Err(err) = futures_lite::future::block_on(job.call(&cell)) {
                    tracing::error!("uncaught error in async job: {err}");
                }
            }
        }

        let promise_jobs = std::mem::take(&mut *self.promise_jobs.borrow_mut());
        for job in promise_jobs {
            if let Err(err) = job.call(context) {
                tracing::error!("uncaught error in promise job: {err}");
            }
        }

        context.clear_kept_objects();
    }
}

impl Default for JobPump {
    fn default() -> Self {
        Self::new()
    }
}

impl JobExecutor for JobPump {
    fn enqueue_job(self: Rc<Self>, job: Job, _context: &mut Context) {
        match job {
            Job::PromiseJob(job) => self.promise_jobs.borrow_mut().push_back(job),
            Job::AsyncJob(job) => self.async_jobs.borrow_mut().push_back(job),
            Job::GenericJob(job) => self.generic_jobs.borrow_mut().push_back(job),
            _ => {
                tracing::warn!("unsupported job type enqueued, ignoring");
            }
        }
    }

    fn run_jobs(self: Rc<Self>, context: &mut Context) -> boa_engine::JsResult<()> {
        while self.has_pending_jobs() {
            self.drain_slice(context);
        }
        Ok(())
    }
}
