//! Sandbox runtime: the Boa context wrapper, its native bindings, the job
//! pump and the JSON conversions at the engine boundary.

pub mod bindings;
pub mod context;
pub mod conversions;
pub mod job_pump;
