//! Invocation results.
//!
//! Every [`InvocationRequest`](super::InvocationRequest) produces exactly one
//! `InvocationResult`: the dispatch executor classifies the terminal state of
//! the invocation and nothing past that boundary can change it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Terminal classification of one dispatched invocation.
///
/// `Dispatched -> {Completed | Cancelled | Failed}`; the states are terminal
/// and mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    /// The context's handler returned normally; its reply is forwarded
    /// verbatim.
    Completed,
    /// The context was preempted/terminated by the host (resource-limit
    /// enforcement) or an external cancellation signal fired while the
    /// request was in flight. Surfaced, never retried.
    Cancelled,
    /// Any other error during dispatch.
    Failed,
}

/// The single result produced for an invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationResult {
    /// HTTP status the gateway answers with.
    pub http_status: u16,
    /// Response body; for `Completed` this is the sandbox reply verbatim,
    /// otherwise a `{"msg": ...}` envelope.
    pub body: Value,
    /// Terminal dispatch classification.
    pub outcome: Outcome,
}

impl InvocationResult {
    /// Wraps a sandbox reply forwarded verbatim.
    pub fn completed(http_status: u16, body: Value) -> Self {
        Self {
            http_status,
            body,
            outcome: Outcome::Completed,
        }
    }

    /// A host-preempted or externally aborted invocation, surfaced as a
    /// generic 500.
    pub fn cancelled(msg: impl std::fmt::Display) -> Self {
        Self {
            http_status: 500,
            body: json!({ "msg": msg.to_string() }),
            outcome: Outcome::Cancelled,
        }
    }

    /// Any other dispatch failure, surfaced as a generic 500.
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        Self {
            http_status: 500,
            body: json!({ "msg": msg.to_string() }),
            outcome: Outcome::Failed,
        }
    }

    /// Renders a pre-dispatch error (validation, worker creation) with its
    /// taxonomy-defined status code.
    pub fn from_error(err: &super::GatewayError) -> Self {
        let outcome = match err {
            super::GatewayError::Cancelled(_) => Outcome::Cancelled,
            _ => Outcome::Failed,
        };
        Self {
            http_status: err.http_status(),
            body: json!({ "msg": err.to_string() }),
            outcome,
        }
    }
}
