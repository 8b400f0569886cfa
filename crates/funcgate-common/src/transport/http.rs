//! HTTP envelope helpers.
//!
//! Conversion between the gateway's protocol types and hyper requests and
//! responses. Everything the gateway answers is JSON: either a forwarded
//! sandbox reply or the uniform `{"msg": ...}` envelope.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use serde_json::{json, Value};

use crate::protocol::InvocationResult;

/// Type alias for hyper incoming requests.
pub type HyperRequest = Request<Incoming>;

/// Type alias for hyper responses with a full body.
pub type HyperResponse = Response<Full<Bytes>>;

/// Builders for the gateway's JSON responses.
pub struct HttpEnvelope;

impl HttpEnvelope {
    /// Renders an [`InvocationResult`] as an HTTP response, body forwarded
    /// verbatim.
    pub fn from_result(result: &InvocationResult) -> HyperResponse {
        let status = StatusCode::from_u16(result.http_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::json(status, &result.body)
    }

    /// Renders the uniform `{"msg": ...}` error envelope.
    pub fn msg(status: StatusCode, msg: impl std::fmt::Display) -> HyperResponse {
        Self::json(status, &json!({ "msg": msg.to_string() }))
    }

    /// Constant health-check payload, status 200 regardless of method or
    /// body.
    pub fn health() -> HyperResponse {
        Self::json(StatusCode::OK, &json!({ "message": "ok" }))
    }

    /// Serializes `body` as an `application/json` response.
    pub fn json(status: StatusCode, body: &Value) -> HyperResponse {
        let bytes = serde_json::to_vec(body).unwrap_or_default();

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(bytes)))
            // Infallible: status and header are statically well formed.
            .unwrap()
    }
}
