//! POST /unstake
//!
//! Without `signedBurnTx`: phase 1, returns the transaction to sign.
//! With it: phase 2, verifies, submits and settles.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::error::ApiError;
use crate::api::middleware::{validate_amount, validate_solana_address, CorrelationId};
use crate::api::server::SharedAppState;
use crate::types::api::UnstakeRequest;

pub async fn handle_unstake(
    State(state): State<SharedAppState>,
    correlation_id: CorrelationId,
    Json(req): Json<UnstakeRequest>,
) -> Response {
    let settings = state.engine.settings();
    let checked = validate_solana_address(req.user_wallet.trim())
        .merge(validate_amount(req.amount, settings.min_amount, settings.max_amount))
        .into_result();
    if let Err(rejection) = checked {
        return rejection.into_response();
    }

    let result = match req.signed_burn_tx.as_deref().map(str::trim).filter(|tx| !tx.is_empty()) {
        None => state
            .engine
            .prepare_unstake(&req.user_wallet, req.amount)
            .await
            .map(|prepared| Json(prepared).into_response()),
        Some(signed) => state
            .engine
            .finalize_unstake(&req.user_wallet, req.amount, signed, Some(correlation_id.as_str()))
            .await
            .map(|submitted| Json(submitted).into_response()),
    };

    result.unwrap_or_else(|e| ApiError::from_settlement(e, &correlation_id).into_response())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::settlement::test_support::wallet;
    use crate::sol_client::{
        decode_transaction, encode_transaction, unstake_transaction, LedgerError, MockSettlementLedger,
    };
    use crate::storage::{UnstakeLedger, VaultAccumulator};
    use crate::types::unstake::UnstakeStatus;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signer};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn ledger(authority: Arc<Keypair>) -> MockSettlementLedger {
        let mut ledger = MockSettlementLedger::new();
        ledger.expect_authority().return_const(authority.pubkey());
        ledger.expect_balance().returning(|_| Ok(100_000_000_000));
        let mint = Pubkey::new_unique();
        ledger
            .expect_build_unstake_transaction()
            .returning(move |user, units, memo| {
                unstake_transaction(&authority, user, &mint, units, memo, Hash::new_unique())
            });
        ledger
    }

    #[tokio::test]
    async fn test_two_phase_unstake() {
        let mut ledger = ledger(Arc::new(Keypair::new()));
        ledger
            .expect_submit_transaction()
            .times(1)
            .returning(|_| Ok("burnsig".to_string()));

        let (app, store) = app(ledger, None);
        store.apply_delta(Decimal::from(10), Decimal::from(10)).await.unwrap();

        let user = Keypair::new();
        let wallet = user.pubkey().to_string();

        let response = app
            .clone()
            .oneshot(post_json("/unstake", json!({ "userWallet": wallet, "amount": "4" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let prepared = body_json(response).await;
        let unstake_id = prepared["unstakeId"].as_str().unwrap().to_string();

        let mut tx = decode_transaction(prepared["tx"].as_str().unwrap()).unwrap();
        let blockhash = tx.message.recent_blockhash;
        tx.partial_sign(&[&user], blockhash);
        let signed = encode_transaction(&tx).unwrap();

        let response = app
            .oneshot(post_json(
                "/unstake",
                json!({ "userWallet": wallet, "amount": "4", "signedBurnTx": signed }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["txSig"], "burnsig");

        let intent = store.get_unstake(&unstake_id).await.unwrap().unwrap();
        assert_eq!(intent.status, UnstakeStatus::Settled);
        assert_eq!(store.get_or_create().await.unwrap().total_minted, Decimal::from(6));
    }

    #[tokio::test]
    async fn test_unsigned_submission_is_bad_request() {
        let (app, store) = app(ledger(Arc::new(Keypair::new())), None);
        store.apply_delta(Decimal::from(10), Decimal::from(10)).await.unwrap();
        let user = wallet();

        let response = app
            .clone()
            .oneshot(post_json("/unstake", json!({ "userWallet": user, "amount": "1" })))
            .await
            .unwrap();
        let prepared = body_json(response).await;

        let response = app
            .oneshot(post_json(
                "/unstake",
                json!({ "userWallet": user, "amount": "1", "signedBurnTx": prepared["tx"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.get_or_create().await.unwrap().total_minted, Decimal::from(10));
    }

    #[tokio::test]
    async fn test_submission_failure_is_bad_gateway() {
        let mut ledger = ledger(Arc::new(Keypair::new()));
        ledger
            .expect_submit_transaction()
            .returning(|_| Err(LedgerError::Rpc("blockhash not found".into())));

        let (app, store) = app(ledger, None);
        store.apply_delta(Decimal::from(10), Decimal::from(10)).await.unwrap();
        let user = Keypair::new();
        let wallet = user.pubkey().to_string();

        let response = app
            .clone()
            .oneshot(post_json("/unstake", json!({ "userWallet": wallet, "amount": "1" })))
            .await
            .unwrap();
        let prepared = body_json(response).await;
        let mut tx = decode_transaction(prepared["tx"].as_str().unwrap()).unwrap();
        let blockhash = tx.message.recent_blockhash;
        tx.partial_sign(&[&user], blockhash);

        let response = app
            .oneshot(post_json(
                "/unstake",
                json!({
                    "userWallet": wallet,
                    "amount": "1",
                    "signedBurnTx": encode_transaction(&tx).unwrap()
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["code"], "SUBMISSION_FAILED");
        assert!(!body["error"].as_str().unwrap().contains("blockhash"));
        assert!(body["correlationId"].is_string());
    }
}
