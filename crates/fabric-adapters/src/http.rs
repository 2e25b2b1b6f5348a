// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared HTTP plumbing for the adapter dialects.
//!
//! Sync calls are a single JSON POST under a deadline. Streamed calls read
//! `text/event-stream`-style `data: <json>` lines, map each through a
//! dialect-specific translator, and guarantee exactly one terminal `final`
//! event no matter how the upstream connection ends.

use fabric_core::{StreamEvent, TraceContext};
use fabric_error::{ErrorBody, ErrorCode, GatewayError};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Channel capacity for streamed events (backpressure bound).
const STREAM_CAPACITY: usize = 64;

/// POST a JSON body and parse the JSON response, honouring the deadline.
///
/// # Errors
///
/// `TIMEOUT` on deadline expiry, `AGENT_OFFLINE` when the connection fails,
/// `UPSTREAM_ERROR` for non-2xx responses or unparseable bodies.
pub async fn post_json(
    client: &reqwest::Client,
    uri: &str,
    body: &serde_json::Value,
    deadline: Duration,
) -> Result<serde_json::Value, GatewayError> {
    let fut = client.post(uri).json(body).send();

    let response = tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| timeout_error(deadline))?
        .map_err(connect_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::new(
            ErrorCode::UpstreamError,
            "upstream agent returned an error status",
        )
        .with_detail("status", status.as_u16()));
    }

    tokio::time::timeout(deadline, response.json::<serde_json::Value>())
        .await
        .map_err(|_| timeout_error(deadline))?
        .map_err(|e| {
            GatewayError::new(ErrorCode::UpstreamError, "upstream response was not valid JSON")
                .with_source(e)
        })
}

/// POST a JSON body and stream the response as mapped events.
///
/// `map_event` translates one upstream `data:` payload into zero or one
/// canonical events. The returned stream:
///
/// - ends with exactly one `final` event (synthesized on EOF or error);
/// - drops anything the upstream sends after its own `final`;
/// - aborts the read (closing the connection) when the receiver is dropped;
/// - converts deadline expiry into a terminal `TIMEOUT` event.
pub async fn post_stream<F>(
    client: &reqwest::Client,
    uri: &str,
    body: &serde_json::Value,
    deadline: Duration,
    trace: TraceContext,
    map_event: F,
) -> Result<ReceiverStream<StreamEvent>, GatewayError>
where
    F: Fn(serde_json::Value) -> Option<StreamEvent> + Send + 'static,
{
    let fut = client
        .post(uri)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(body)
        .send();

    let response = tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| timeout_error(deadline))?
        .map_err(connect_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::new(
            ErrorCode::UpstreamError,
            "upstream agent returned an error status",
        )
        .with_detail("status", status.as_u16()));
    }

    let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_CAPACITY);

    tokio::spawn(async move {
        let outcome = tokio::time::timeout(
            deadline,
            forward_events(response, &tx, trace, map_event),
        )
        .await;

        match outcome {
            Ok(StreamOutcome::Terminal) => {}
            Ok(StreamOutcome::Eof) => {
                // Upstream closed without a final event; synthesize one.
                let err = ErrorBody::from(GatewayError::new(
                    ErrorCode::UpstreamError,
                    "upstream stream ended without a terminal event",
                ));
                let _ = tx.send(StreamEvent::final_error(trace, err)).await;
            }
            Ok(StreamOutcome::Cancelled) => {
                debug!(target: "fabric.adapter", "stream receiver dropped; transport closed");
            }
            Err(_) => {
                let err = ErrorBody::from(timeout_error(deadline));
                let _ = tx.send(StreamEvent::final_error(trace, err)).await;
            }
        }
    });

    Ok(ReceiverStream::new(rx))
}

enum StreamOutcome {
    /// A terminal event was forwarded.
    Terminal,
    /// The upstream closed before a terminal event.
    Eof,
    /// The receiver went away.
    Cancelled,
}

async fn forward_events<F>(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
    trace: TraceContext,
    map_event: F,
) -> StreamOutcome
where
    F: Fn(serde_json::Value) -> Option<StreamEvent>,
{
    let mut body = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!(target: "fabric.adapter", error = %e, "stream read failed");
                let err = ErrorBody::from(GatewayError::upstream(e));
                let _ = tx.send(StreamEvent::final_error(trace, err)).await;
                return StreamOutcome::Terminal;
            }
        };
        buffer.extend_from_slice(&chunk);

        // Process complete lines; keep the trailing partial line buffered.
        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            let Some(payload) = parse_data_line(&line) else {
                continue;
            };
            let Some(event) = map_event(payload) else {
                continue;
            };
            let terminal = event.is_terminal();
            // Terminal events from dialects may lack trace identifiers.
            let event = if terminal && event.trace.is_none() {
                event.with_trace(trace)
            } else {
                event
            };
            if tx.send(event).await.is_err() {
                return StreamOutcome::Cancelled;
            }
            if terminal {
                // Anything after `final` is dropped by contract.
                return StreamOutcome::Terminal;
            }
        }
    }

    StreamOutcome::Eof
}

/// Extract the JSON payload from one `data: <json>` line, if present.
fn parse_data_line(line: &[u8]) -> Option<serde_json::Value> {
    let text = std::str::from_utf8(line).ok()?.trim();
    let payload = text.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    serde_json::from_str(payload).ok()
}

pub(crate) fn timeout_error(deadline: Duration) -> GatewayError {
    GatewayError::new(ErrorCode::Timeout, "call exceeded its deadline")
        .with_detail("timeout_ms", deadline.as_millis() as u64)
}

pub(crate) fn connect_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::new(ErrorCode::AgentOffline, "agent endpoint is unreachable").with_source(e)
    } else if e.is_timeout() {
        GatewayError::new(ErrorCode::Timeout, "call exceeded its deadline").with_source(e)
    } else {
        GatewayError::upstream(e)
    }
}

/// GET `{base}/health` with a short timeout; 2xx means online.
pub async fn probe_endpoint(client: &reqwest::Client, base: &str) -> bool {
    let uri = format!("{}/health", base.trim_end_matches('/'));
    let fut = client.get(&uri).send();
    match tokio::time::timeout(Duration::from_secs(2), fut).await {
        Ok(Ok(resp)) => resp.status().is_success(),
        _ => false,
    }
}
