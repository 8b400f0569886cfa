//! Invocation gateway core.
//!
//! Accepts HTTP requests naming a user script, synthesizes a sandbox module
//! around the raw script text, runs it in a pooled, resource-bounded
//! JavaScript context and classifies every invocation as completed,
//! cancelled or failed. All failures surface as deterministic JSON
//! responses; none are fatal to the gateway.
//!
//! Pipeline: [`router`] extracts and validates the function identity,
//! [`synthesizer`] renders the module, [`worker`] pools and dispatches, and
//! [`runtime`] owns the engine boundary.

pub mod config;
pub mod gateway;
pub mod http_server;
pub mod router;
pub mod runtime;
pub mod synthesizer;
pub mod worker;

pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use http_server::HttpServer;
