use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

/// How loudly a finished request is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Quiet,
    Success,
    ClientError,
    ServerError,
}

fn outcome(path: &str, status: StatusCode) -> Outcome {
    if status.is_server_error() {
        Outcome::ServerError
    } else if status.is_client_error() {
        Outcome::ClientError
    } else if path.starts_with("/health") {
        // Probes hit these every few seconds.
        Outcome::Quiet
    } else {
        Outcome::Success
    }
}

pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let admin = path.starts_with("/api/admin");

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %req_id,
        method = %method,
        path = %path,
        admin,
        "incoming request"
    );

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    match outcome(&path, status) {
        Outcome::ServerError => tracing::error!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            admin,
            "request failed"
        ),
        Outcome::ClientError => tracing::warn!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            admin,
            "request rejected"
        ),
        Outcome::Success => tracing::info!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            admin,
            "request completed"
        ),
        Outcome::Quiet => tracing::debug!(
            request_id = %req_id,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "health probe"
        ),
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_by_status_and_path() {
        assert_eq!(outcome("/health", StatusCode::OK), Outcome::Quiet);
        assert_eq!(
            outcome("/health/ready", StatusCode::SERVICE_UNAVAILABLE),
            Outcome::ServerError
        );
        assert_eq!(outcome("/api/notices", StatusCode::OK), Outcome::Success);
        assert_eq!(
            outcome("/api/admin/notices", StatusCode::UNAUTHORIZED),
            Outcome::ClientError
        );
    }
}
