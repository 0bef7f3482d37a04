//! POST /stake-init

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::error::ApiError;
use crate::api::middleware::{validate_amount, validate_solana_address, CorrelationId};
use crate::api::server::SharedAppState;
use crate::types::api::{StakeInitRequest, StakeInitResponse};

/// Record a pending stake intent; the returned id may be sent as the deposit memo
pub async fn handle_stake_init(
    State(state): State<SharedAppState>,
    correlation_id: CorrelationId,
    Json(req): Json<StakeInitRequest>,
) -> Response {
    let settings = state.engine.settings();
    let checked = validate_solana_address(req.user_wallet.trim())
        .merge(validate_amount(req.amount, settings.min_amount, settings.max_amount))
        .into_result();
    if let Err(rejection) = checked {
        return rejection.into_response();
    }

    match state.engine.create_intent(&req.user_wallet, req.amount).await {
        Ok(tx_id) => Json(StakeInitResponse { tx_id }).into_response(),
        Err(e) => ApiError::from_settlement(e, &correlation_id).into_response(),
    }
}
