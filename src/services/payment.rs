//! Settlement strategies: how stablecoin value moves from the agent wallet
//! to the merchant.
//!
//! Two interchangeable back-ends sit behind [`SettlementStrategy`]: a signed
//! transfer authorization handed to an x402 facilitator, and a bridged
//! transfer into a card-network crypto deposit address scoped to the
//! merchant's connected account. The orchestrator treats both identically.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{ChainConfig, USDC_DOMAIN_NAME, USDC_DOMAIN_VERSION};
use crate::services::engine::ChainEngine;
use crate::services::stripe::StripeClient;
use crate::services::usdc_math::{is_positive_usdc, parse_usdc, usdc_to_cents};

/// 0.0001 ETH: floor below which the wallet cannot pay gas for a transfer.
const MIN_GAS_WEI: u128 = 100_000_000_000_000;
const FACILITATOR_RETRY_BACKOFF: Duration = Duration::from_secs(3);
/// Validity window of a transfer authorization, also advertised to the
/// facilitator as maxTimeoutSeconds.
const AUTHORIZATION_VALIDITY_SECS: i64 = 300;

#[derive(Debug)]
pub enum PaymentError {
    InvalidAmount(String),
    Failed { message: String, retriable: bool },
}

impl PaymentError {
    fn terminal(message: String) -> Self {
        PaymentError::Failed {
            message,
            retriable: false,
        }
    }

    fn retriable(message: String) -> Self {
        PaymentError::Failed {
            message,
            retriable: true,
        }
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::InvalidAmount(amount) => write!(f, "invalid amount: {}", amount),
            PaymentError::Failed { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for PaymentError {}

/// What a completed settlement hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub payment_reference: String,
    pub tx_hash: String,
    pub settled_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettlementStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn settle(
        &self,
        from: Address,
        amount_usdc: &str,
    ) -> Result<SettlementOutcome, PaymentError>;
}

// ---------------------------------------------------------------------------
// Strategy A: facilitator hand-off (signed transfer authorization)
// ---------------------------------------------------------------------------

pub struct FacilitatorSettlement {
    engine: Arc<dyn ChainEngine>,
    http: reqwest::Client,
    facilitator_url: String,
    pay_to: Address,
    chain: ChainConfig,
    retry_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct SettleResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl FacilitatorSettlement {
    pub fn new(
        engine: Arc<dyn ChainEngine>,
        facilitator_url: String,
        pay_to: Address,
        chain: ChainConfig,
    ) -> Self {
        Self {
            engine,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            facilitator_url,
            pay_to,
            chain,
            retry_backoff: FACILITATOR_RETRY_BACKOFF,
        }
    }

    /// The EIP-3009 TransferWithAuthorization message plus the typed-data
    /// envelope the custody engine signs.
    fn build_authorization(&self, from: Address, value_raw: i128) -> (Value, Value) {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let valid_before = Utc::now().timestamp() + AUTHORIZATION_VALIDITY_SECS;
        let authorization = json!({
            "from": from.to_string(),
            "to": self.pay_to.to_string(),
            "value": value_raw.to_string(),
            "validAfter": "0",
            "validBefore": valid_before.to_string(),
            "nonce": format!("0x{}", hex::encode(nonce)),
        });

        let typed_data = json!({
            "domain": {
                "name": USDC_DOMAIN_NAME,
                "version": USDC_DOMAIN_VERSION,
                "chainId": self.chain.chain_id,
                "verifyingContract": self.chain.usdc.to_string(),
            },
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "TransferWithAuthorization": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "validAfter", "type": "uint256" },
                    { "name": "validBefore", "type": "uint256" },
                    { "name": "nonce", "type": "bytes32" },
                ],
            },
            "primaryType": "TransferWithAuthorization",
            "message": authorization,
        });

        (typed_data, authorization)
    }

    async fn post_settle(&self, body: &Value) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .post(format!("{}/settle", self.facilitator_url))
            .json(body)
            .send()
            .await
    }
}

#[async_trait]
impl SettlementStrategy for FacilitatorSettlement {
    fn name(&self) -> &'static str {
        "facilitator"
    }

    async fn settle(
        &self,
        from: Address,
        amount_usdc: &str,
    ) -> Result<SettlementOutcome, PaymentError> {
        if !is_positive_usdc(amount_usdc) {
            return Err(PaymentError::InvalidAmount(amount_usdc.to_string()));
        }
        let value_raw =
            parse_usdc(amount_usdc).map_err(|_| PaymentError::InvalidAmount(amount_usdc.to_string()))?;

        let (typed_data, authorization) = self.build_authorization(from, value_raw);
        let signature = self
            .engine
            .sign_typed_data(from, typed_data)
            .await
            .map_err(|e| PaymentError::terminal(format!("authorization signing failed: {}", e)))?;

        let body = json!({
            "payload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": self.chain.network,
                "payload": {
                    "signature": signature,
                    "authorization": authorization,
                },
            },
            "paymentRequirements": {
                "scheme": "exact",
                "network": self.chain.network,
                "maxAmountRequired": value_raw.to_string(),
                "payTo": self.pay_to.to_string(),
                "asset": self.chain.usdc.to_string(),
                "maxTimeoutSeconds": AUTHORIZATION_VALIDITY_SECS,
            },
        });

        // one retry on a timeout or 5xx, after a fixed backoff
        let mut response = self.post_settle(&body).await;
        let should_retry = match &response {
            Ok(resp) => resp.status().is_server_error(),
            Err(err) => err.is_timeout(),
        };
        if should_retry {
            warn!(
                facilitator = %self.facilitator_url,
                "facilitator settle failed transiently, retrying once"
            );
            tokio::time::sleep(self.retry_backoff).await;
            response = self.post_settle(&body).await;
        }

        let response = response
            .map_err(|e| PaymentError::retriable(format!("facilitator request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Failed {
                message: format!("facilitator /settle error {}: {}", status, text),
                retriable: status.is_server_error(),
            });
        }

        let settle: SettleResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::terminal(format!("facilitator bad response: {}", e)))?;

        if !settle.success {
            return Err(PaymentError::terminal(format!(
                "facilitator rejected settlement: {}",
                settle.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        let tx_hash = settle.transaction.ok_or_else(|| {
            PaymentError::terminal("facilitator response missing transaction hash".to_string())
        })?;

        info!(tx_hash = %tx_hash, "facilitator settlement complete");

        Ok(SettlementOutcome {
            payment_reference: tx_hash.clone(),
            tx_hash,
            settled_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Strategy B: connected-account bridge (crypto payment intent)
// ---------------------------------------------------------------------------

pub struct StripeSettlement {
    engine: Arc<dyn ChainEngine>,
    stripe: StripeClient,
    merchant_account_id: Option<String>,
    chain: ChainConfig,
}

impl StripeSettlement {
    pub fn new(
        engine: Arc<dyn ChainEngine>,
        stripe: StripeClient,
        merchant_account_id: Option<String>,
        chain: ChainConfig,
    ) -> Self {
        Self {
            engine,
            stripe,
            merchant_account_id,
            chain,
        }
    }

    async fn cancel_quietly(&self, payment_intent_id: &str) {
        if let Err(err) = self.stripe.cancel_payment_intent(payment_intent_id).await {
            error!(
                payment_intent = %payment_intent_id,
                error = %err,
                "failed to cancel orphaned payment intent"
            );
        }
    }
}

#[async_trait]
impl SettlementStrategy for StripeSettlement {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn settle(
        &self,
        from: Address,
        amount_usdc: &str,
    ) -> Result<SettlementOutcome, PaymentError> {
        // no money moves unless the merchant can receive it
        let Some(account) = self.merchant_account_id.as_deref() else {
            return Err(PaymentError::terminal(
                "merchant has no connected card-network account".to_string(),
            ));
        };

        if !is_positive_usdc(amount_usdc) {
            return Err(PaymentError::InvalidAmount(amount_usdc.to_string()));
        }
        let value_raw =
            parse_usdc(amount_usdc).map_err(|_| PaymentError::InvalidAmount(amount_usdc.to_string()))?;
        let amount_cents = usdc_to_cents(amount_usdc)
            .map_err(|_| PaymentError::InvalidAmount(amount_usdc.to_string()))?;

        let gas = self
            .engine
            .native_balance(from)
            .await
            .map_err(|e| PaymentError::retriable(format!("gas balance query failed: {}", e)))?;
        if gas < U256::from(MIN_GAS_WEI) {
            return Err(PaymentError::terminal(format!(
                "insufficient native balance for gas: {} wei",
                gas
            )));
        }

        let intent = self
            .stripe
            .create_crypto_payment_intent(amount_cents, account)
            .await
            .map_err(|e| PaymentError::terminal(format!("payment intent creation failed: {}", e)))?;

        let deposit_address = intent
            .next_action
            .as_ref()
            .and_then(|na| na.crypto_collect_deposit_details.as_ref())
            .and_then(|details| details.deposit_addresses.get(self.chain.network))
            .map(|entry| entry.address.clone());

        let Some(deposit_address) = deposit_address else {
            self.cancel_quietly(&intent.id).await;
            return Err(PaymentError::terminal(format!(
                "payment intent {} returned no deposit address for network {}",
                intent.id, self.chain.network
            )));
        };

        let to = match Address::from_str(&deposit_address) {
            Ok(to) => to,
            Err(_) => {
                self.cancel_quietly(&intent.id).await;
                return Err(PaymentError::terminal(format!(
                    "payment intent {} returned malformed deposit address {}",
                    intent.id, deposit_address
                )));
            }
        };

        let transaction_id = self
            .engine
            .transfer(from, self.chain.usdc, to, U256::from(value_raw as u128))
            .await
            .map_err(|e| PaymentError::terminal(format!("transfer enqueue failed: {}", e)))?;

        info!(
            transaction_id = %transaction_id,
            payment_intent = %intent.id,
            deposit_address = %deposit_address,
            amount_usdc = %amount_usdc,
            "USDC transfer enqueued"
        );

        // The transfer is already in flight here; a confirmation failure must
        // not be answered by sending money again.
        let tx_hash = match self.engine.wait_for_hash(&transaction_id).await {
            Ok(hash) => hash,
            Err(err) => {
                return Err(PaymentError::retriable(format!(
                    "transfer enqueued (engine tx {}, intent {}) but hash confirmation failed: {}",
                    transaction_id, intent.id, err
                )));
            }
        };

        Ok(SettlementOutcome {
            payment_reference: intent.id,
            tx_hash,
            settled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::engine::EngineError;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEngine {
        native_balance_wei: u128,
    }

    impl Default for FakeEngine {
        fn default() -> Self {
            Self {
                native_balance_wei: 1_000_000_000_000_000_000,
            }
        }
    }

    #[async_trait]
    impl ChainEngine for FakeEngine {
        async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256, EngineError> {
            Ok(U256::from(100_000_000u64))
        }

        async fn native_balance(&self, _owner: Address) -> Result<U256, EngineError> {
            Ok(U256::from(self.native_balance_wei))
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

    fn test_chain() -> ChainConfig {
        ChainConfig {
            chain_id: 84532,
            network: "base-sepolia",
            usdc: Address::ZERO,
        }
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn facilitator(engine: Arc<dyn ChainEngine>, addr: SocketAddr) -> FacilitatorSettlement {
        FacilitatorSettlement {
            engine,
            http: reqwest::Client::new(),
            facilitator_url: format!("http://{}", addr),
            pay_to: Address::ZERO,
            chain: test_chain(),
            retry_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn facilitator_retries_once_on_server_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/settle",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR)
                    } else {
                        Ok(Json(json!({ "success": true, "transaction": "0xabc" })))
                    }
                }),
            )
            .with_state(hits.clone());
        let addr = serve(router).await;

        let strategy = facilitator(Arc::new(FakeEngine::default()), addr);
        let outcome = strategy.settle(Address::ZERO, "10.00").await.unwrap();

        assert_eq!(outcome.tx_hash, "0xabc");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn facilitator_fails_after_second_server_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/settle",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(hits.clone());
        let addr = serve(router).await;

        let strategy = facilitator(Arc::new(FakeEngine::default()), addr);
        let err = strategy.settle(Address::ZERO, "10.00").await.unwrap_err();

        assert!(matches!(err, PaymentError::Failed { retriable: true, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn facilitator_missing_transaction_is_terminal() {
        let router = Router::new().route(
            "/settle",
            post(|| async { Json(json!({ "success": true })) }),
        );
        let addr = serve(router).await;

        let strategy = facilitator(Arc::new(FakeEngine::default()), addr);
        let err = strategy.settle(Address::ZERO, "10.00").await.unwrap_err();

        assert!(matches!(err, PaymentError::Failed { retriable: false, .. }));
    }

    #[tokio::test]
    async fn stripe_settles_through_deposit_address() {
        let router = Router::new().route(
            "/v1/payment_intents",
            post(|| async {
                Json(json!({
                    "id": "pi_123",
                    "next_action": {
                        "crypto_collect_deposit_details": {
                            "deposit_addresses": {
                                "base-sepolia": { "address": "0x00000000000000000000000000000000000000aa" }
                            }
                        }
                    }
                }))
            }),
        );
        let addr = serve(router).await;

        let strategy = StripeSettlement::new(
            Arc::new(FakeEngine::default()),
            StripeClient::with_base_url("sk_test".to_string(), format!("http://{}", addr)),
            Some("acct_1".to_string()),
            test_chain(),
        );

        let outcome = strategy.settle(Address::ZERO, "12.50").await.unwrap();
        assert_eq!(outcome.payment_reference, "pi_123");
        assert_eq!(outcome.tx_hash, "0xhash");
    }

    #[tokio::test]
    async fn stripe_cancels_intent_when_deposit_details_missing() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/v1/payment_intents",
                post(|| async { Json(json!({ "id": "pi_456" })) }),
            )
            .route(
                "/v1/payment_intents/{id}/cancel",
                post(|State(cancels): State<Arc<AtomicUsize>>| async move {
                    cancels.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "id": "pi_456", "status": "canceled" }))
                }),
            )
            .with_state(cancels.clone());
        let addr = serve(router).await;

        let strategy = StripeSettlement::new(
            Arc::new(FakeEngine::default()),
            StripeClient::with_base_url("sk_test".to_string(), format!("http://{}", addr)),
            Some("acct_1".to_string()),
            test_chain(),
        );

        let err = strategy.settle(Address::ZERO, "12.50").await.unwrap_err();
        assert!(matches!(err, PaymentError::Failed { retriable: false, .. }));
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stripe_fails_fast_without_connected_account() {
        let strategy = StripeSettlement::new(
            Arc::new(FakeEngine::default()),
            StripeClient::with_base_url("sk_test".to_string(), "http://127.0.0.1:9".to_string()),
            None,
            test_chain(),
        );

        let err = strategy.settle(Address::ZERO, "1.00").await.unwrap_err();
        assert!(matches!(err, PaymentError::Failed { retriable: false, .. }));
    }

    #[tokio::test]
    async fn stripe_requires_gas_floor() {
        let engine = Arc::new(FakeEngine {
            native_balance_wei: 10,
        });
        let strategy = StripeSettlement::new(
            engine,
            StripeClient::with_base_url("sk_test".to_string(), "http://127.0.0.1:9".to_string()),
            Some("acct_1".to_string()),
            test_chain(),
        );

        let err = strategy.settle(Address::ZERO, "1.00").await.unwrap_err();
        assert!(matches!(err, PaymentError::Failed { retriable: false, .. }));
    }
}
