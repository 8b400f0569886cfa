pub mod http;

pub use http::{HttpEnvelope, HyperRequest, HyperResponse};
