pub mod error;
pub mod requests;
pub mod responses;


pub use error::{GatewayError, Result};
pub use requests::{FunctionIdentity, InvocationRequest, ScriptArgs};
pub use responses::{InvocationResult, Outcome};
