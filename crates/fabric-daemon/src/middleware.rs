// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-request bookkeeping for the HTTP front.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Response header echoing the request id assigned by the front.
pub const REQUEST_ID_HEADER: &str = "x-fabric-request-id";

/// The id this front assigned to an in-flight request, available to
/// handlers as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Assigns a request id, times the handler, emits one structured log line
/// per request, and echoes the id back as [`REQUEST_ID_HEADER`].
///
/// Transport-level only: the pipeline's trace context is the correlation
/// mechanism clients see; this id exists so front logs can be matched to a
/// client-reported response header without parsing bodies.
pub async fn track_request(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let route = req.uri().path().to_owned();
    req.extensions_mut().insert(RequestId(request_id));

    let started = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        target: "fabric.daemon",
        %request_id,
        %method,
        %route,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );

    resp
}
