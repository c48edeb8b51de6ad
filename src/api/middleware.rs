use crate::error::ErrorLogged;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Log every 4xx/5xx the API produces, with its latency. Responses already
/// logged by the handler only get a debug line.
pub async fn log_request_errors(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri().clone();
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    if response.extensions().get::<ErrorLogged>().is_some() {
        debug!(%method, %uri, %status, elapsed_ms, "Request failed");
    } else if status.is_client_error() {
        warn!(%method, %uri, %status, elapsed_ms, "Client error");
    } else {
        error!(%method, %uri, %status, elapsed_ms, "Server error");
    }

    response
}
