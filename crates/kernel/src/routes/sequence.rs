//! Document-number endpoint.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Create the sequence router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/sequence", get(next_number))
}

#[derive(Deserialize)]
struct SequenceQuery {
    #[serde(rename = "type")]
    type_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SequenceResponse {
    success: bool,
    next_number: String,
}

/// Preview the next number for a document type.
///
/// Nothing is reserved; the number is taken once a record carrying it is
/// saved.
async fn next_number(
    State(state): State<AppState>,
    query: Result<Query<SequenceQuery>, QueryRejection>,
) -> AppResult<Json<SequenceResponse>> {
    let Query(query) = query?;
    let sequences = state.sequences();
    let type_key = query
        .type_key
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "query parameter `type` is required (one of: {})",
                sequences.registry().type_keys().join(", ")
            ))
        })?;

    let next_number = sequences.next_number(type_key.trim()).await?;
    Ok(Json(SequenceResponse {
        success: true,
        next_number,
    }))
}
