//! Category tree endpoint.
//!
//! Plain category CRUD goes through the generic record routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::category::CategoryNode;
use crate::error::AppResult;
use crate::state::AppState;

/// Create the category router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/categories/tree", get(category_tree))
}

#[derive(Serialize)]
struct TreeResponse {
    success: bool,
    data: Vec<CategoryNode>,
}

async fn category_tree(State(state): State<AppState>) -> AppResult<Json<TreeResponse>> {
    let data = state.categories().tree().await?;
    Ok(Json(TreeResponse {
        success: true,
        data,
    }))
}
