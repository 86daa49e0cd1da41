//! Indexer progress, exposed read-only over HTTP.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chainledger_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(status))
}

async fn status(State(state): State<AppState>) -> Result<Json<chainledger_indexer::ProgressSnapshot>, AppError> {
    let snapshot = state.progress.snapshot().await?;
    Ok(Json(snapshot))
}
