//! Worker specs, lifecycle and dispatch.

pub mod dispatch;
pub mod pool;
pub mod spec;

pub use dispatch::{dispatch, CancellationSignal};
pub use pool::{Worker, WorkerPool};
pub use spec::{ModuleSource, WorkerSpec};
