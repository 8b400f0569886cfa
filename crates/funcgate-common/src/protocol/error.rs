use thiserror::Error;

/// Error taxonomy of the gateway.
///
/// Every invocation error is caught at the dispatch boundary and rendered as
/// a uniform `{"msg": ...}` JSON envelope; no error in this enum is ever
/// fatal to the gateway process.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing/invalid function identity or malformed request body.
    /// Local to the router, never retried.
    #[error("{0}")]
    Validation(String),

    /// Context creation failed: bad resource limits, module parse/evaluation
    /// failure, or host pool exhaustion.
    #[error("worker creation failed: {0}")]
    WorkerCreation(String),

    /// Host-driven preemption (CPU/wall-clock enforcement) or an externally
    /// fired cancellation signal hit an in-flight invocation.
    #[error("invocation cancelled: {0}")]
    Cancelled(String),

    /// The script raised inside the sandbox in a place the sandbox handler
    /// could not absorb.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// HTTP status the error surfaces as. Only validation failures are the
    /// caller's fault; everything else is a 500.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
