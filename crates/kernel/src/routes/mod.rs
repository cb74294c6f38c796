//! HTTP route handlers.

pub mod category;
pub mod health;
pub mod records;
pub mod sequence;

use axum::Router;

use crate::state::AppState;

/// Every kernel route, without middleware.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(sequence::router())
        .merge(category::router())
        .merge(records::router())
}
