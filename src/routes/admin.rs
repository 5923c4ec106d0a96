/**
 * Admin CRUD Routes
 * List/create/update/delete for every editable collection, behind a Bearer token
 */
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::crud::{create_or_update, delete_confirmed, fetch_one, patch_record, Editable};
use crate::error::{AppError, AppResult};
use crate::pagination::{clamp_page_size, load_all, load_page, Page};
use crate::routes::{labeled, require_admin, DeleteQuery, Labeled, ListQuery, SuccessResponse};
use crate::state::AppState;
use crate::store::StoreError;

/// Report a missing record under its own name ("Notice does not exist").
fn not_found_as<E: Editable>(err: AppError) -> AppError {
    match err {
        AppError::Store(StoreError::NotFound { .. }) => AppError::NotFound(E::LABEL),
        other => other,
    }
}

/// GET /api/admin/{collection}
/// Whole collection unless `pageSize` is given.
pub async fn list<E: Editable>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Labeled<E>>>> {
    require_admin(&state, &headers).await?;

    let store = state.store.as_ref();
    let page = match query.page_size {
        Some(size) => {
            load_page::<E>(store, E::ORDER, clamp_page_size(Some(size)), query.cursor()?).await?
        }
        None => Page {
            items: load_all::<E>(store, E::ORDER).await?,
            next_cursor: None,
            has_more: false,
        },
    };

    Ok(Json(page.map(|record| labeled(record, &state))))
}

/// POST /api/admin/{collection}
pub async fn create<E: Editable>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<E::Input>,
) -> AppResult<(StatusCode, Json<Labeled<E>>)> {
    require_admin(&state, &headers).await?;

    let id = create_or_update::<E>(state.store.as_ref(), None, &input).await?;
    let record = fetch_one::<E>(state.store.as_ref(), &id).await?;
    Ok((StatusCode::CREATED, Json(labeled(record, &state))))
}

/// PATCH /api/admin/{collection}/{id}
/// Only the fields present in the body change.
pub async fn update<E: Editable>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<E::Patch>,
) -> AppResult<Json<Labeled<E>>> {
    require_admin(&state, &headers).await?;

    let record = patch_record::<E>(state.store.as_ref(), &id, patch)
        .await
        .map_err(not_found_as::<E>)?;
    Ok(Json(labeled(record, &state)))
}

/// DELETE /api/admin/{collection}/{id}?confirm=true
pub async fn delete<E: Editable>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<Json<SuccessResponse>> {
    require_admin(&state, &headers).await?;

    let deleted =
        delete_confirmed(state.store.as_ref(), E::ORDER.collection, &id, |_| query.confirm)
            .await
            .map_err(not_found_as::<E>)?;
    if !deleted {
        return Err(AppError::ConfirmationRequired);
    }
    Ok(Json(SuccessResponse { success: true }))
}
