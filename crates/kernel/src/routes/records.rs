//! Generic record routes.
//!
//! Every registered entity is served by the same handlers under
//! `/api/{entity}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::entity::{ListPage, RecordService};
use crate::error::{AppError, AppResult};
use crate::query::ListParams;
use crate::record::Document;
use crate::state::AppState;

/// Create the record router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/{entity}", get(list_records).post(create_record))
        .route(
            "/api/{entity}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
}

// -------------------------------------------------------------------------
// Response types
// -------------------------------------------------------------------------

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    #[serde(flatten)]
    page: ListPage,
}

#[derive(Serialize)]
struct RecordResponse {
    success: bool,
    data: Document,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

fn service(state: &AppState, entity: &str) -> AppResult<RecordService> {
    state
        .entities()
        .get(entity)
        .ok_or_else(|| AppError::NotFound(format!("unknown entity: {entity}")))
}

async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> AppResult<Json<ListResponse>> {
    let service = service(&state, &entity)?;
    let Query(pairs) = query?;
    let params = ListParams::from_pairs(pairs, state.default_page_limit());
    let page = service.list(&params).await?;

    Ok(Json(ListResponse {
        success: true,
        page,
    }))
}

async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> AppResult<Json<RecordResponse>> {
    let data = service(&state, &entity)?.get(&id).await?;
    Ok(Json(RecordResponse {
        success: true,
        data,
    }))
}

async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RecordResponse>)> {
    let Json(payload) = payload?;
    let data = service(&state, &entity)?.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordResponse {
            success: true,
            data,
        }),
    ))
}

async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<RecordResponse>> {
    let Json(payload) = payload?;
    let data = service(&state, &entity)?.update(&id, payload).await?;
    Ok(Json(RecordResponse {
        success: true,
        data,
    }))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> AppResult<Json<DeleteResponse>> {
    service(&state, &entity)?.delete(&id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("{entity} record {id} deleted"),
    }))
}
