use serde::{Deserialize, Serialize};

/// First path segment of the request URL; also the pool key for context
/// reuse.
pub type FunctionIdentity = String;

/// Arguments handed to the user script's `main(args)` (a JSON object).
pub type ScriptArgs = serde_json::Map<String, serde_json::Value>;

/// One inbound invocation, decoded from a `POST /{function}` body of the
/// shape `{script, args}`.
///
/// Constructed once per inbound call and discarded after dispatch; it carries
/// no cross-request state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRequest {
    /// Which user script to execute; extracted from the URL path, not the
    /// body.
    #[serde(skip)]
    pub function_identity: FunctionIdentity,
    /// Raw script text: the body of an asynchronous function taking one
    /// `args` parameter.
    pub script: String,
    /// Arguments forwarded into the sandbox.
    #[serde(default)]
    pub args: ScriptArgs,
    /// When true the pool discards any existing context for this identity
    /// and creates a fresh one.
    #[serde(default)]
    pub force_create: bool,
}

impl InvocationRequest {
    pub fn new(function_identity: impl Into<String>, script: impl Into<String>, args: ScriptArgs) -> Self {
        Self {
            function_identity: function_identity.into(),
            script: script.into(),
            args,
            force_create: false,
        }
    }

    /// Decodes the `{script, args}` body and attaches the identity taken
    /// from the URL path.
    pub fn from_body(function_identity: impl Into<String>, body: &[u8]) -> super::Result<Self> {
        let mut request: InvocationRequest = serde_json::from_slice(body).map_err(|e| {
            super::GatewayError::Validation(format!("malformed request body: {}", e))
        })?;
        request.function_identity = function_identity.into();
        Ok(request)
    }
}
