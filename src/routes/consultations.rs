/**
 * Consultation Routes
 * Public intake form plus the admin list, status change and delete
 */
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::crud::{
    delete_confirmed, set_consultation_status, submit_consultation, ConsultationInput,
    CONSULTATIONS,
};
use crate::error::{AppError, AppResult};
use crate::models::{format_date_time, Consultation, ConsultationStatus};
use crate::pagination::{clamp_page_size, load_all, load_page, Page};
use crate::routes::{require_admin, DeleteQuery, Labeled, ListQuery, SuccessResponse};
use crate::state::AppState;
use crate::store::{Collection, StoreError};

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusRequest {
    pub status: ConsultationStatus,
}

fn with_label(consultation: Consultation, state: &AppState) -> Labeled<Consultation> {
    let date_label = consultation
        .created_at
        .map(|at| format_date_time(&at, state.tz()));
    Labeled {
        record: consultation,
        date_label,
    }
}

fn not_found(err: AppError) -> AppError {
    match err {
        AppError::Store(StoreError::NotFound { .. }) => AppError::NotFound("Consultation"),
        other => other,
    }
}

/// POST /api/consultations
/// No authentication; status always starts as `new`.
pub async fn submit(
    State(state): State<AppState>,
    Json(input): Json<ConsultationInput>,
) -> AppResult<(StatusCode, Json<Labeled<Consultation>>)> {
    let consultation = submit_consultation(state.store.as_ref(), &input).await?;
    Ok((StatusCode::CREATED, Json(with_label(consultation, &state))))
}

/// GET /api/admin/consultations
pub async fn admin_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Labeled<Consultation>>>> {
    require_admin(&state, &headers).await?;

    let store = state.store.as_ref();
    let page = match query.page_size {
        Some(size) => {
            load_page::<Consultation>(
                store,
                CONSULTATIONS,
                clamp_page_size(Some(size)),
                query.cursor()?,
            )
            .await?
        }
        None => Page {
            items: load_all::<Consultation>(store, CONSULTATIONS).await?,
            next_cursor: None,
            has_more: false,
        },
    };

    Ok(Json(page.map(|c| with_label(c, &state))))
}

/// PATCH /api/admin/consultations/{id}/status
pub async fn admin_set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> AppResult<Json<SuccessResponse>> {
    require_admin(&state, &headers).await?;

    set_consultation_status(state.store.as_ref(), &id, request.status)
        .await
        .map_err(not_found)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// DELETE /api/admin/consultations/{id}?confirm=true
pub async fn admin_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Json<SuccessResponse>> {
    require_admin(&state, &headers).await?;

    let deleted = delete_confirmed(state.store.as_ref(), Collection::Consultations, &id, |_| {
        query.confirm
    })
    .await
    .map_err(not_found)?;
    if !deleted {
        return Err(AppError::ConfirmationRequired);
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send};
    use axum::routing::{delete, get, patch, post};
    use axum::Router;
    use serde_json::json;

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/api/consultations", post(submit))
            .route("/api/admin/consultations", get(admin_list))
            .route(
                "/api/admin/consultations/{id}/status",
                patch(admin_set_status),
            )
            .route("/api/admin/consultations/{id}", delete(admin_delete))
            .with_state(state)
    }

    async fn submit_one(state: &AppState) -> String {
        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/consultations",
            None,
            Some(json!({
                "name": "Kim",
                "phone": "031-206-7676",
                "message": "Inheritance tax question"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "new");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_intake_rejects_bad_phone() {
        let state = AppState::for_tests();
        let (status, body) = send(
            router(state),
            "POST",
            "/api/consultations",
            None,
            Some(json!({ "name": "Kim", "phone": "call me", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_status_change_and_delete() {
        let state = AppState::for_tests();
        let token = admin_token(&state).await;
        let id = submit_one(&state).await;

        let (status, _) = send(
            router(state.clone()),
            "PATCH",
            &format!("/api/admin/consultations/{}/status", id),
            Some(&token),
            Some(json!({ "status": "in-progress" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, list) = send(
            router(state.clone()),
            "GET",
            "/api/admin/consultations",
            Some(&token),
            None,
        )
        .await;
        let item = &list["items"][0];
        assert_eq!(item["status"], "in-progress");
        assert_eq!(item["name"], "Kim");
        assert!(item.get("updatedAt").is_none());
        assert!(item["dateLabel"].as_str().unwrap().contains(':'));

        let (status, _) = send(
            router(state.clone()),
            "DELETE",
            &format!("/api/admin/consultations/{}?confirm=false", id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            router(state.clone()),
            "DELETE",
            &format!("/api/admin/consultations/{}?confirm=true", id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            router(state),
            "PATCH",
            &format!("/api/admin/consultations/{}/status", id),
            Some(&token),
            Some(json!({ "status": "done" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Consultation does not exist");
    }

    #[tokio::test]
    async fn test_admin_list_requires_token() {
        let state = AppState::for_tests();
        let (status, _) = send(router(state), "GET", "/api/admin/consultations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
