use super::request_id::REQUEST_ID_HEADER;
use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

/// Log one `request_completed` event per request under the `metrics` target.
///
/// Latency is measured until the response head is ready; streamed bodies
/// (downloads, archives) keep flowing after this point and report
/// `bytes = "stream"`.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(req).await;

    let latency = start.elapsed();
    let bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("stream")
        .to_string();

    info!(
        target: "metrics",
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        bytes = %bytes,
        request_id = %request_id,
        "request_completed"
    );

    response
}
