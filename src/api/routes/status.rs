//! Read-only endpoints: intent status, wallet history, vault totals, operator view

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::error::ApiError;
use crate::api::middleware::CorrelationId;
use crate::api::server::SharedAppState;
use crate::types::api::{HistoryQuery, StatusResponse};

/// GET /transactions/status/:id
pub async fn handle_get_status(
    State(state): State<SharedAppState>,
    correlation_id: CorrelationId,
    Path(id): Path<String>,
) -> Response {
    match state.engine.get_status(&id).await {
        Ok(status) => Json(StatusResponse { status }).into_response(),
        Err(e) => ApiError::from_settlement(e, &correlation_id).into_response(),
    }
}

/// GET /transactions/status?user=...&limit=...
pub async fn handle_list_history(
    State(state): State<SharedAppState>,
    correlation_id: CorrelationId,
    Query(query): Query<HistoryQuery>,
) -> Response {
    match state.engine.list_recent_by_user(&query.user, query.limit).await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => ApiError::from_settlement(e, &correlation_id).into_response(),
    }
}

/// GET /transactions/unresolved
pub async fn handle_unresolved(State(state): State<SharedAppState>, correlation_id: CorrelationId) -> Response {
    match state.engine.unresolved().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => ApiError::from_settlement(e, &correlation_id).into_response(),
    }
}

/// GET /vault
pub async fn handle_vault(State(state): State<SharedAppState>, correlation_id: CorrelationId) -> Response {
    match state.engine.vault_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => ApiError::from_settlement(e, &correlation_id).into_response(),
    }
}
