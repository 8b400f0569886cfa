//! funcgate Common Types
//!
//! Shared protocol definitions and HTTP envelope helpers for the funcgate
//! invocation gateway.
//!
//! # Overview
//!
//! funcgate accepts HTTP requests naming a user-defined script, executes the
//! script inside an isolated, resource-bounded execution context, and returns
//! its output as a structured JSON response. This crate contains the pieces
//! shared between the server and the cli:
//!
//! - [`protocol`] - `InvocationRequest`, `InvocationResult`, the `Outcome`
//!   classification and the `GatewayError` taxonomy
//! - [`transport`] - hyper type aliases and the uniform `{msg}` JSON envelope

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::*;
