//! Request logging middleware.
//!
//! One line per request with method, path, status and latency. Health probes are
//! not logged.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

const QUIET_PATHS: &[&str] = &["/health"];

/// Log level bucket for a response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    ClientError,
    ServerError,
}

impl Outcome {
    fn of(status: u16) -> Self {
        match status {
            500.. => Outcome::ServerError,
            400..=499 => Outcome::ClientError,
            _ => Outcome::Ok,
        }
    }
}

/// Logs at INFO for success and 4xx, WARN for 5xx.
pub async fn request_logging_simple(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if QUIET_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    match Outcome::of(status) {
        Outcome::ServerError => warn!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency_ms,
            "Request failed (5xx)"
        ),
        Outcome::ClientError => info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency_ms,
            "Request rejected (4xx)"
        ),
        Outcome::Ok => info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency_ms,
            "Request completed"
        ),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_buckets() {
        assert_eq!(Outcome::of(200), Outcome::Ok);
        assert_eq!(Outcome::of(302), Outcome::Ok);
        assert_eq!(Outcome::of(401), Outcome::ClientError);
        assert_eq!(Outcome::of(404), Outcome::ClientError);
        assert_eq!(Outcome::of(500), Outcome::ServerError);
        assert_eq!(Outcome::of(503), Outcome::ServerError);
    }
}
