// SPDX-License-Identifier: MIT OR Apache-2.0
//! The local JSON front.
//!
//! Line-delimited `{id, name, arguments}` requests on stdin; line-delimited
//! responses on stdout. The caller is local, so there is no authentication.
//! Streamed calls emit one `{id, event}` line per event; the `final` event
//! is the last line for that id.

use fabric_core::CallRequest;
use fabric_pipeline::{CallOutcome, Gateway};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error};

/// One inbound local-front request.
#[derive(Debug, Deserialize)]
struct LocalRequest {
    /// Caller-chosen correlation id, echoed on every output line.
    #[serde(default)]
    id: serde_json::Value,
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Serve the local front until stdin closes.
///
/// Requests are handled concurrently; output lines are serialized through
/// one writer task so interleaved responses stay line-atomic.
pub async fn run<R, W>(gateway: Gateway, reader: R, writer: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel::<String>(64);
    let writer_task = tokio::spawn(write_lines(writer, line_rx));

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let gateway = gateway.clone();
        let line_tx = line_tx.clone();
        tokio::spawn(async move {
            handle_line(&gateway, &line, &line_tx).await;
        });
    }

    drop(line_tx);
    let _ = writer_task.await;
}

async fn write_lines<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err()
            || writer.write_all(b"\n").await.is_err()
        {
            error!(target: "fabric.stdio", "stdout write failed; stopping");
            return;
        }
        let _ = writer.flush().await;
    }
}

async fn handle_line(gateway: &Gateway, line: &str, out: &mpsc::Sender<String>) {
    let (id, outcome) = match serde_json::from_str::<LocalRequest>(line) {
        Ok(request) => {
            debug!(target: "fabric.stdio", name = %request.name, "local call");
            let outcome = gateway
                .handle_local(CallRequest::new(request.name, request.arguments))
                .await;
            (request.id, outcome)
        }
        Err(e) => {
            // Unparseable line: report through the pipeline's parse phase so
            // the envelope shape (and trace) stays canonical.
            let outcome = gateway.handle_raw(line.as_bytes(), None).await;
            debug!(target: "fabric.stdio", error = %e, "malformed local request");
            (serde_json::Value::Null, outcome)
        }
    };

    match outcome {
        CallOutcome::Response(envelope) => {
            let mut body = serde_json::to_value(envelope).unwrap_or_default();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("id".into(), id);
            }
            let _ = out.send(body.to_string()).await;
        }
        CallOutcome::Stream(mut stream) => {
            while let Some(event) = stream.next().await {
                let line = serde_json::json!({"id": id, "event": event});
                if out.send(line.to_string()).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_adapters::HttpAdapterFactory;
    use fabric_auth::Verifier;
    use fabric_bus::MessageBus;
    use fabric_registry::AgentRegistry;
    use fabric_tools::ToolHost;
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway() -> Gateway {
        Gateway::new(
            AgentRegistry::in_memory(),
            ToolHost::new(),
            MessageBus::new(Duration::from_secs(30)),
            Arc::new(HttpAdapterFactory::new()),
            Verifier::new(Some("unused-on-local".into())),
        )
    }

    async fn run_lines(input: &str) -> Vec<serde_json::Value> {
        let (write_half, read_back) = tokio::io::duplex(64 * 1024);
        run(gateway(), input.as_bytes(), write_half).await;

        let mut lines = BufReader::new(read_back).lines();
        let mut out = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn health_round_trip_with_id() {
        let out = run_lines("{\"id\": 7, \"name\": \"fabric.health\"}\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], 7);
        assert_eq!(out[0]["ok"], true);
        assert_eq!(out[0]["result"]["registry"], "ok");
    }

    #[tokio::test]
    async fn local_front_skips_auth() {
        // The verifier requires a secret, but local callers bypass it.
        let out = run_lines("{\"id\": 1, \"name\": \"fabric.health\"}\n").await;
        assert_eq!(out[0]["ok"], true);
    }

    #[tokio::test]
    async fn malformed_line_reports_bad_input() {
        let out = run_lines("{oops\n").await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["ok"], false);
        assert_eq!(out[0]["error"]["code"], "BAD_INPUT");
        assert!(out[0]["trace"]["trace_id"].is_string());
    }

    #[tokio::test]
    async fn multiple_requests_each_get_answers() {
        let input = "{\"id\": 1, \"name\": \"fabric.health\"}\n{\"id\": 2, \"name\": \"fabric.agent.list\"}\n";
        let out = run_lines(input).await;
        assert_eq!(out.len(), 2);
        let ids: std::collections::BTreeSet<i64> =
            out.iter().map(|v| v["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, std::collections::BTreeSet::from([1, 2]));
    }
}
