use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::request_id::REQUEST_ID_HEADER;

/// Route template for the request, so `/jobs/{id}` is logged as one route
/// instead of one per job. Unrouted requests fall back to the raw path.
fn route_label(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let route = route_label(&req);
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(req).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::warn!(
            target: "metrics",
            %method, %route, %request_id, status, latency_ms,
            "request_completed"
        );
    } else {
        tracing::info!(
            target: "metrics",
            %method, %route, %request_id, status, latency_ms,
            "request_completed"
        );
    }

    response
}
