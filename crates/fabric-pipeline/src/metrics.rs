// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gateway call counters.
//!
//! Lock-free atomics; a snapshot is cheap and taken per metrics request.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for the pipeline.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    calls_total: AtomicU64,
    errors_total: AtomicU64,
    agent_calls: AtomicU64,
    tool_calls: AtomicU64,
    bus_operations: AtomicU64,
    streamed_calls: AtomicU64,
    fallback_attempts: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// All calls accepted by the pipeline.
    pub calls_total: u64,
    /// Calls that produced a failure envelope.
    pub errors_total: u64,
    /// `fabric.call` dispatches.
    pub agent_calls: u64,
    /// Tool host dispatches.
    pub tool_calls: u64,
    /// Message bus operations.
    pub bus_operations: u64,
    /// Calls answered with a streamed event sequence.
    pub streamed_calls: u64,
    /// Fallback agents tried after a primary failure.
    pub fallback_attempts: u64,
}

impl GatewayMetrics {
    /// Fresh, zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_call(&self) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_agent_call(&self) {
        self.agent_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tool_call(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bus_operation(&self) {
        self.bus_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_streamed_call(&self) {
        self.streamed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback_attempt(&self) {
        self.fallback_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_total: self.calls_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            agent_calls: self.agent_calls.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            bus_operations: self.bus_operations.load(Ordering::Relaxed),
            streamed_calls: self.streamed_calls.load(Ordering::Relaxed),
            fallback_attempts: self.fallback_attempts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = GatewayMetrics::new();
        m.record_call();
        m.record_call();
        m.record_error();
        m.record_agent_call();
        m.record_streamed_call();

        let snap = m.snapshot();
        assert_eq!(snap.calls_total, 2);
        assert_eq!(snap.errors_total, 1);
        assert_eq!(snap.agent_calls, 1);
        assert_eq!(snap.streamed_calls, 1);
        assert_eq!(snap.tool_calls, 0);
    }
}
