// SPDX-License-Identifier: MIT OR Apache-2.0
//! Distributed trace identifiers.
//!
//! Every call carries exactly one `trace_id` and one fresh `span_id` per
//! execution attempt. The trace context is the only field guaranteed to
//! appear on every response, success or error.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trace identifiers stamped on every request and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TraceContext {
    /// Identifier for the whole call tree. Adopted from the caller if supplied.
    pub trace_id: Uuid,
    /// Identifier for this execution attempt. Always freshly generated.
    pub span_id: Uuid,
    /// Span that caused this one, if any.
    pub parent_span_id: Option<Uuid>,
}

impl TraceContext {
    /// Start a new trace with no parent.
    #[must_use]
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
        }
    }

    /// Adopt a caller-supplied trace id, generating a fresh span.
    #[must_use]
    pub fn adopt(trace_id: Uuid) -> Self {
        Self {
            trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: None,
        }
    }

    /// Context for an outbound call: same trace, fresh span, parent = current.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        let t = TraceContext::root();
        assert!(t.parent_span_id.is_none());
        assert_ne!(t.trace_id, Uuid::nil());
        assert_ne!(t.span_id, Uuid::nil());
    }

    #[test]
    fn adopt_keeps_trace_id() {
        let id = Uuid::new_v4();
        let t = TraceContext::adopt(id);
        assert_eq!(t.trace_id, id);
        assert_ne!(t.span_id, id);
    }

    #[test]
    fn child_links_to_parent_span() {
        let parent = TraceContext::root();
        let child = parent.child();
        assert_eq!(child.trace_id, parent.trace_id);
        assert_eq!(child.parent_span_id, Some(parent.span_id));
        assert_ne!(child.span_id, parent.span_id);
    }

    #[test]
    fn span_ids_are_unique_across_contexts() {
        let a = TraceContext::root();
        let b = TraceContext::root();
        assert_ne!(a.span_id, b.span_id);
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn serde_roundtrip() {
        let t = TraceContext::root().child();
        let json = serde_json::to_string(&t).unwrap();
        let back: TraceContext = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
