// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire request/response envelopes shared by both transport fronts.

use crate::trace::TraceContext;
use fabric_error::{ErrorBody, GatewayError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A wire request: `{"name": "<fabric.*>", "arguments": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallRequest {
    /// Fully-qualified call name.
    pub name: String,
    /// JSON argument object.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl CallRequest {
    /// Create a request with the given name and arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The canonical response envelope.
///
/// `trace` is always present, on success and on every error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallResponse {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Trace identifiers for this execution attempt.
    pub trace: TraceContext,
    /// Result payload (`null` on failure).
    pub result: Option<serde_json::Value>,
    /// Error payload (absent on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CallResponse {
    /// A successful response.
    #[must_use]
    pub fn success(trace: TraceContext, result: serde_json::Value) -> Self {
        Self {
            ok: true,
            trace,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(trace: TraceContext, error: impl Into<ErrorBody>) -> Self {
        Self {
            ok: false,
            trace,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Convert into a `Result`, treating a missing error body as internal.
    ///
    /// # Errors
    ///
    /// Returns the embedded [`GatewayError`] when `ok` is `false`.
    pub fn into_result(self) -> Result<serde_json::Value, GatewayError> {
        if self.ok {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(self
                .error
                .map(GatewayError::from)
                .unwrap_or_else(|| GatewayError::internal("failure envelope without error body")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_error::ErrorCode;

    #[test]
    fn success_shape() {
        let resp = CallResponse::success(TraceContext::root(), serde_json::json!({"x": 1}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json["trace"]["trace_id"].is_string());
        assert_eq!(json["result"]["x"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_shape() {
        let err = GatewayError::new(ErrorCode::AgentNotFound, "agent 'nobody' is not registered");
        let resp = CallResponse::failure(TraceContext::root(), err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["result"], serde_json::Value::Null);
        assert_eq!(json["error"]["code"], "AGENT_NOT_FOUND");
        assert!(json["trace"]["span_id"].is_string());
    }

    #[test]
    fn into_result_success() {
        let resp = CallResponse::success(TraceContext::root(), serde_json::json!(7));
        assert_eq!(resp.into_result().unwrap(), serde_json::json!(7));
    }

    #[test]
    fn into_result_failure() {
        let resp = CallResponse::failure(
            TraceContext::root(),
            GatewayError::new(ErrorCode::Timeout, "deadline"),
        );
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[test]
    fn request_default_arguments() {
        let req: CallRequest = serde_json::from_str(r#"{"name": "fabric.health"}"#).unwrap();
        assert_eq!(req.name, "fabric.health");
        assert!(req.arguments.is_null());
    }
}
