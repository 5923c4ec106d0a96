/**
 * Analytics Routes
 * Page-view ingestion and the admin dashboard summary
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use crate::analytics::{record_page_view, summarize, AnalyticsSummary, PageView};
use crate::error::AppResult;
use crate::routes::require_admin;
use crate::state::AppState;

/// POST /api/analytics/page-view
/// Body `{ page, userId, userAgent }`, every field optional.
pub async fn page_view(
    State(state): State<AppState>,
    Json(view): Json<PageView>,
) -> impl IntoResponse {
    match record_page_view(state.store.as_ref(), view).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
        Err(e) => {
            tracing::error!("Error logging page view: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

/// GET /api/admin/analytics
/// Serves the refresher's latest summary when one is running, otherwise
/// summarizes on the spot.
pub async fn admin_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<AnalyticsSummary>> {
    require_admin(&state, &headers).await?;

    if state.config.analytics.refresh_interval.is_some() {
        if let Some(summary) = state.analytics.read().await.clone() {
            return Ok(Json(summary));
        }
    }

    let summary = summarize(state.store.as_ref(), Utc::now(), state.tz()).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send};
    use crate::store::Collection;
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::json;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/api/analytics/page-view", post(page_view))
            .route("/api/admin/analytics", get(admin_summary))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_page_view_then_summary() {
        let state = AppState::for_tests();

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/analytics/page-view",
            None,
            Some(json!({ "page": "/tax-info" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, _) = send(
            router(state.clone()),
            "POST",
            "/api/analytics/page-view",
            None,
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.store.count(Collection::Analytics, &[]).await.unwrap();
        assert_eq!(stored, 2);

        let token = admin_token(&state).await;
        let (status, summary) =
            send(router(state), "GET", "/api/admin/analytics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["daily"], 2);
        assert_eq!(summary["dailyGrowth"], 0.0);
        assert_eq!(summary["dayBuckets"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_summary_requires_token() {
        let state = AppState::for_tests();
        let (status, _) = send(router(state), "GET", "/api/admin/analytics", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
