use axum::{extract::State, http::StatusCode, Json};

use crate::models::error::ErrorResponse;
use crate::models::purchase::{PurchaseRequest, PurchaseResult};
use crate::AppState;

pub async fn purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResult>, (StatusCode, Json<ErrorResponse>)> {
    match state.purchase.purchase(request).await {
        Ok(result) => Ok(Json(result)),
        Err(err) => {
            let (status, body) = ErrorResponse::from_purchase_error(&err);
            Err((status, Json(body)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::models::product::ProductDetail;
    use crate::services::engine::{ChainEngine, EngineError};
    use crate::services::payment::{PaymentError, SettlementOutcome, SettlementStrategy};
    use crate::services::purchase::PurchaseService;
    use crate::services::shopify::{
        CatalogError, CreateOrderParams, CreateOrderResult, OrderAdapter, OrderError,
        ProductCatalog,
    };
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct FakeEngine;

    #[async_trait]
    impl ChainEngine for FakeEngine {
        async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256, EngineError> {
            Ok(U256::from(100_000_000u64))
        }

        async fn native_balance(&self, _owner: Address) -> Result<U256, EngineError> {
            Ok(U256::from(1_000_000_000_000_000_000u128))
        }

        async fn sign_typed_data(
            &self,
            _from: Address,
            _typed_data: Value,
        ) -> Result<String, EngineError> {
            Ok("0xsignature".to_string())
        }

        async fn transfer(
            &self,
            _from: Address,
            _token: Address,
            _to: Address,
            _amount_raw: U256,
        ) -> Result<String, EngineError> {
            Ok("queue-1".to_string())
        }

        async fn wait_for_hash(&self, _transaction_id: &str) -> Result<String, EngineError> {
            Ok("0xhash".to_string())
        }
    }

    struct FakeCatalog;

    #[async_trait]
    impl ProductCatalog for FakeCatalog {
        async fn get_product(&self, product_id: &str) -> Result<ProductDetail, CatalogError> {
            Ok(ProductDetail {
                id: product_id.to_string(),
                title: "Widget".to_string(),
                description: String::new(),
                price_usdc: "10.000000".to_string(),
                images: vec![],
                variants: vec![],
            })
        }
    }

    struct FakeStrategy;

    #[async_trait]
    impl SettlementStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn settle(
            &self,
            _from: Address,
            _amount_usdc: &str,
        ) -> Result<SettlementOutcome, PaymentError> {
            Ok(SettlementOutcome {
                payment_reference: "pi_1".to_string(),
                tx_hash: "0xabc".to_string(),
                settled_at: Utc::now(),
            })
        }
    }

    struct FakeOrders;

    #[async_trait]
    impl OrderAdapter for FakeOrders {
        async fn create_order(
            &self,
            _params: CreateOrderParams,
        ) -> Result<CreateOrderResult, OrderError> {
            Ok(CreateOrderResult {
                merchant_order_id: "gid://shopify/Order/1".to_string(),
                order_number: "#1001".to_string(),
            })
        }
    }

    fn test_app(db: DatabaseConnection) -> Router {
        let engine: Arc<dyn ChainEngine> = Arc::new(FakeEngine);
        let chain = ChainConfig {
            chain_id: 84532,
            network: "base-sepolia",
            usdc: Address::ZERO,
        };
        let purchase = PurchaseService::new(
            db.clone(),
            engine.clone(),
            Arc::new(FakeCatalog),
            Arc::new(FakeOrders),
            Arc::new(FakeStrategy),
            chain.clone(),
            "https://example.myshopify.com".to_string(),
        );
        let state = AppState {
            db,
            engine,
            chain,
            purchase,
        };
        Router::new()
            .route("/api/purchase", post(super::purchase))
            .with_state(state)
    }

    async fn post_purchase(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/purchase")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn unknown_variant_maps_to_validation_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = test_app(db);

        let (status, body) = post_purchase(
            app,
            json!({
                "wallet_id": Uuid::new_v4(),
                "api_key_id": Uuid::new_v4(),
                "product_id": "gid://shopify/Product/7",
                "variant_id": "missing-variant",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["retriable"], false);
    }

    #[tokio::test]
    async fn missing_wallet_maps_to_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results::<crate::entities::wallets::Model, _, _>([vec![]])
            .into_connection();
        let app = test_app(db);

        let (status, body) = post_purchase(
            app,
            json!({
                "wallet_id": Uuid::new_v4(),
                "api_key_id": Uuid::new_v4(),
                "product_id": "gid://shopify/Product/7",
            }),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "WALLET_NOT_FOUND");
    }
}
