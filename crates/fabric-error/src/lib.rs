// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the fabric gateway.
//!
//! Failures anywhere in the gateway funnel into a [`GatewayError`]: a stable
//! [`ErrorCode`], a client-safe message, structured details, and (for logs
//! only) an optional cause. The wire form is [`ErrorBody`] — what a failure
//! envelope actually carries; the cause never crosses into it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request parsing / argument validation errors.
    Request,
    /// Authentication and credential errors.
    Auth,
    /// Agent resolution and dispatch errors.
    Agent,
    /// Tool host errors.
    Tool,
    /// Message bus errors.
    Bus,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Request => "request",
            Self::Auth => "auth",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::Bus => "bus",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Request --
    /// The request body or arguments failed to parse or validate.
    BadInput,
    /// Too many requests from this caller.
    RateLimited,

    // -- Auth --
    /// The credential was recognised but rejected.
    AuthDenied,
    /// The credential was structurally malformed.
    AuthInvalid,
    /// The credential has expired (reserved for the passport path).
    AuthExpired,

    // -- Agent --
    /// The requested agent id is not registered.
    AgentNotFound,
    /// The agent is registered but not dispatchable.
    AgentOffline,
    /// The named capability is absent from the target's manifest.
    CapabilityNotFound,
    /// The upstream call exceeded its deadline.
    Timeout,
    /// The upstream agent returned an error or unusable response.
    UpstreamError,

    // -- Tool --
    /// The requested tool id is not hosted.
    ToolNotFound,
    /// The tool ran but reported a failure.
    ToolExecutionError,

    // -- Bus --
    /// The message bus could not complete the operation.
    BusUnavailable,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadInput | Self::RateLimited => ErrorCategory::Request,

            Self::AuthDenied | Self::AuthInvalid | Self::AuthExpired => ErrorCategory::Auth,

            Self::AgentNotFound
            | Self::AgentOffline
            | Self::CapabilityNotFound
            | Self::Timeout
            | Self::UpstreamError => ErrorCategory::Agent,

            Self::ToolNotFound | Self::ToolExecutionError => ErrorCategory::Tool,

            Self::BusUnavailable => ErrorCategory::Bus,

            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g. `"BAD_INPUT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadInput => "BAD_INPUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::AuthDenied => "AUTH_DENIED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::AgentOffline => "AGENT_OFFLINE",
            Self::CapabilityNotFound => "CAPABILITY_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            Self::BusUnavailable => "BUS_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status the HTTP front uses when a call fails with this code.
    ///
    /// The response body is always the canonical failure envelope; the status
    /// is advisory for plain-HTTP clients.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadInput => 400,
            Self::AuthDenied | Self::AuthInvalid | Self::AuthExpired => 401,
            Self::AgentNotFound | Self::ToolNotFound | Self::CapabilityNotFound => 404,
            Self::ToolExecutionError => 422,
            Self::RateLimited => 429,
            Self::Internal => 500,
            Self::UpstreamError => 502,
            Self::AgentOffline | Self::BusUnavailable => 503,
            Self::Timeout => 504,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// The error type that crosses crate boundaries inside the gateway.
///
/// Two audiences read a `GatewayError`, and they see different things. The
/// client sees its wire form ([`ErrorBody`]): code, message, details. The
/// operator additionally sees `source`, which stays on the log side and is
/// never serialized — keeping raw upstream text off the wire is why
/// [`upstream`](GatewayError::upstream) exists.
#[derive(Debug)]
pub struct GatewayError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description. Never contains raw upstream error text.
    pub message: String,
    /// Arbitrary structured details for diagnostics and clients.
    pub details: BTreeMap<String, serde_json::Value>,
    /// Optional underlying cause, for logs only.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
            source: None,
        }
    }

    /// Shorthand for a `BAD_INPUT` error.
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadInput, message)
    }

    /// Shorthand for an `INTERNAL_ERROR` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Wrap an upstream failure without leaking its text to the client.
    ///
    /// The wire message stays generic; the original error rides along as the
    /// source so log output still has the full story.
    pub fn upstream(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorCode::UpstreamError, "upstream agent call failed").with_source(source)
    }

    /// Attach a key-value pair to the details map.
    ///
    /// A value that cannot be serialized is dropped — an error path must not
    /// manufacture a second error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.details.insert(key.into(), v);
                self
            }
            Err(_) => self,
        }
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// The wire form of this error, without the source.
    pub fn to_wire(&self) -> ErrorBody {
        ErrorBody {
            code: self.code,
            message: self.message.clone(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        for (key, value) in &self.details {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// What a failure envelope carries: `{code, message, details}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ErrorBody {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<GatewayError> for ErrorBody {
    fn from(err: GatewayError) -> Self {
        Self {
            code: err.code,
            message: err.message,
            details: err.details,
        }
    }
}

impl From<ErrorBody> for GatewayError {
    fn from(body: ErrorBody) -> Self {
        Self {
            code: body.code,
            message: body.message,
            details: body.details,
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
