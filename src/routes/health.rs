/**
 * Health Routes
 * Endpoints for checking backend health status
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed health check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub environment: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub store: ServiceCheck,
    pub analytics_refresher: bool,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_store(state: &AppState) -> ServiceCheck {
    let backend = state.store.backend().to_string();
    match state.store.health_check().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            backend,
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Store health check failed: {}", e);
            ServiceCheck {
                status: "unhealthy".to_string(),
                backend,
                response_time: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// GET /health - Simple health ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed
/// Overall status stays "ok" while the process serves requests; the store
/// check carries its own status.
pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let response = DetailedHealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs(),
        environment: state.config.environment.clone(),
        checks: HealthChecks {
            store: check_store(&state).await,
            analytics_refresher: state.config.analytics.refresh_interval.is_some(),
        },
    };

    (StatusCode::OK, Json(response))
}

/// GET /health/store
pub async fn health_store(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(check_store(&state).await))
}

/// GET /health/ready - 503 until the store answers
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let store = check_store(&state).await;
    let ready = store.error.is_none();

    let response = ReadyResponse {
        status: if ready { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs(),
        reason: store.error,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::send;
    use axum::routing::get;
    use axum::Router;

    fn test_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_ping))
            .route("/health/detailed", get(health_detailed))
            .route("/health/store", get(health_store))
            .route("/health/ready", get(health_ready))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        let (status, body) =
            send(test_router(AppState::for_tests()), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_health_store_reports_backend() {
        let (status, body) =
            send(test_router(AppState::for_tests()), "GET", "/health/store", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "memory");
    }

    #[tokio::test]
    async fn test_health_detailed_returns_ok() {
        let (status, body) = send(
            test_router(AppState::for_tests()),
            "GET",
            "/health/detailed",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["uptime"].is_u64());
        assert_eq!(body["checks"]["analyticsRefresher"], false);
    }

    #[tokio::test]
    async fn test_health_ready_returns_ready() {
        let (status, body) =
            send(test_router(AppState::for_tests()), "GET", "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert!(body.get("reason").is_none());
    }
}
