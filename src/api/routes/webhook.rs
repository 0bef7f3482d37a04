//! POST /deposit-webhook
//!
//! Acknowledges with 200 once every transfer has a definitive outcome.
//! Internal errors answer 500 so the source redelivers; redelivery is safe
//! because each transfer is deduplicated by its deposit reference.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::middleware::CorrelationId;
use crate::api::server::SharedAppState;
use crate::types::deposit::DepositWebhookBody;

pub async fn handle_deposit_webhook(
    State(state): State<SharedAppState>,
    correlation_id: CorrelationId,
    Json(body): Json<DepositWebhookBody>,
) -> Response {
    let batch = body.into_batch();
    let report = state.engine.reconcile_batch(&batch).await;

    if report.is_clean() {
        (StatusCode::OK, "Webhook processed successfully").into_response()
    } else {
        tracing::error!(
            target: "stakevault::deposit",
            correlation_id = %correlation_id.as_str(),
            errors = report.errors,
            "Deposit batch had internal errors; requesting redelivery"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::api::middleware::RateLimitConfig;
    use crate::settlement::test_support::{settings, wallet};
    use crate::sol_client::MockSettlementLedger;
    use crate::storage::{IntentLedger, VaultAccumulator};
    use crate::types::intent::IntentStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_webhook_mints_once_and_is_idempotent() {
        let mut ledger = MockSettlementLedger::new();
        ledger
            .expect_mint_derivative()
            .times(1)
            .returning(|_, _| Ok("mintsig".to_string()));

        let settings = settings();
        let vault = settings.vault_address.to_string();
        let (app, store) = app_with_settings(ledger, None, RateLimitConfig::default(), settings);
        let user = wallet();

        let response = app
            .clone()
            .oneshot(post_json("/stake-init", json!({ "userWallet": user, "amount": "1" })))
            .await
            .unwrap();
        let id = body_json(response).await["txId"].as_str().unwrap().to_string();

        // Helius-style single object with one transfer to the vault
        let payload = json!({
            "signature": "5sig",
            "nativeTransfers": [
                { "fromUserAccount": user, "toUserAccount": vault, "amount": 1_000_000_000u64 }
            ]
        });

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json("/deposit-webhook", payload.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "Webhook processed successfully");
        }

        let intent = store.get_intent(&id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
        let ledger = store.get_or_create().await.unwrap();
        assert_eq!(ledger.total_minted, Decimal::from(1));
        assert!(ledger.is_pegged());
    }

    #[tokio::test]
    async fn test_webhook_unmatched_deposit_acknowledged() {
        let settings = settings();
        let vault = settings.vault_address.to_string();
        let (app, store) = app_with_settings(
            MockSettlementLedger::new(),
            None,
            RateLimitConfig::default(),
            settings,
        );

        let payload = json!([{
            "signature": "orphan",
            "nativeTransfers": [
                { "fromUserAccount": wallet(), "toUserAccount": vault, "amount": 7u64 }
            ]
        }]);
        let response = app.oneshot(post_json("/deposit-webhook", payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.get_or_create().await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_webhook_requires_secret_when_configured() {
        let (app, _) = app(MockSettlementLedger::new(), Some("s3cret"));
        let payload = json!([{ "signature": "sig", "nativeTransfers": [] }]);

        let response = app
            .clone()
            .oneshot(post_json("/deposit-webhook", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/deposit-webhook")
            .header("content-type", "application/json")
            .header("authorization", "Bearer s3cret")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
