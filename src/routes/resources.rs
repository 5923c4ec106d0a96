/**
 * Resource Routes
 * Public list of external tax resource links
 */
use axum::{extract::State, Json};

use crate::crud::Editable;
use crate::error::AppResult;
use crate::models::Resource;
use crate::pagination::load_all;
use crate::state::AppState;

/// GET /api/resources
pub async fn list_resources(State(state): State<AppState>) -> AppResult<Json<Vec<Resource>>> {
    let resources = load_all::<Resource>(state.store.as_ref(), Resource::ORDER).await?;
    Ok(Json(resources))
}
