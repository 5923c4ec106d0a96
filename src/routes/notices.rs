/**
 * Notice Routes
 * Public notice list ("load more" pages) and notice detail
 */
use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::crud::{fetch_one, Editable};
use crate::error::AppResult;
use crate::models::Notice;
use crate::pagination::{clamp_page_size, load_page, Page};
use crate::routes::{labeled, Labeled, ListQuery};
use crate::state::AppState;

/// GET /api/notices?pageSize=&cursor=
/// Newest first, five per page unless `pageSize` says otherwise.
pub async fn list_notices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Labeled<Notice>>>> {
    let page = load_page::<Notice>(
        state.store.as_ref(),
        Notice::ORDER,
        clamp_page_size(query.page_size),
        query.cursor()?,
    )
    .await?;

    Ok(Json(page.map(|notice| labeled(notice, &state))))
}

/// GET /api/notices/{id}
pub async fn get_notice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Labeled<Notice>>> {
    let notice = fetch_one::<Notice>(state.store.as_ref(), &id).await?;
    Ok(Json(labeled(notice, &state)))
}
