//! HTTP routing.
//!
//! Three surfaces only: the health endpoint, the invocation endpoint and a
//! 400 for everything malformed. Identity extraction happens before the
//! method check so a request with no identity segment always gets the
//! canonical missing-name answer.

use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::{Method, StatusCode};

use crate::gateway::{validate_identity, Gateway};
use funcgate_common::{HttpEnvelope, HyperRequest, HyperResponse, InvocationRequest, Result};

pub const HEALTH_PATH: &str = "/_internal/health";

pub struct GatewayRouter {
    gateway: Arc<Gateway>,
}

impl GatewayRouter {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Routes one request to a response. Infallible by construction; every
    /// error path renders an envelope.
    pub async fn route(&self, req: HyperRequest) -> HyperResponse {
        if req.uri().path() == HEALTH_PATH {
            return HttpEnvelope::health();
        }

        let identity = match identity_from_path(req.uri().path()) {
            Ok(identity) => identity,
            Err(err) => return HttpEnvelope::msg(StatusCode::BAD_REQUEST, err),
        };

        if req.method() != Method::POST {
            return HttpEnvelope::msg(StatusCode::BAD_REQUEST, "invocations must use POST");
        }

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return HttpEnvelope::msg(
                    StatusCode::BAD_REQUEST,
                    format!("malformed request body: {}", e),
                )
            }
        };

        let request = match InvocationRequest::from_body(identity, &body) {
            Ok(request) => request,
            Err(err) => return HttpEnvelope::msg(StatusCode::BAD_REQUEST, err),
        };

        let result = self.gateway.handle_invocation(request).await;
        HttpEnvelope::from_result(&result)
    }
}

/// First path segment is the function identity; anything past it is
/// ignored.
fn identity_from_path(path: &str) -> Result<String> {
    let identity = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
        .to_string();
    validate_identity(&identity)?;
    Ok(identity)
}
