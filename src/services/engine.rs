//! Custody/chain layer client.
//!
//! Read-side (token and gas balances) goes straight to the chain RPC; the
//! write side (typed-data signing, transfer enqueue, hash confirmation) is
//! delegated to the custody engine that holds the server wallet keys.

use alloy::{
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    sol,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

sol! {
    #[sol(rpc)]
    interface IErc20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

#[derive(Debug)]
pub enum EngineError {
    InvalidConfig(String),
    Upstream(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidConfig(msg) => write!(f, "invalid engine config: {}", msg),
            EngineError::Upstream(msg) => write!(f, "engine error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// The balance/settlement layer contract the rest of the system depends on.
#[async_trait]
pub trait ChainEngine: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, EngineError>;

    async fn native_balance(&self, owner: Address) -> Result<U256, EngineError>;

    /// Sign EIP-712 typed data with the custody wallet for `from`.
    async fn sign_typed_data(&self, from: Address, typed_data: Value)
        -> Result<String, EngineError>;

    /// Enqueue an ERC-20 transfer; returns the engine's queue id.
    async fn transfer(
        &self,
        from: Address,
        token: Address,
        to: Address,
        amount_raw: U256,
    ) -> Result<String, EngineError>;

    /// Block until the enqueued transaction resolves to an on-chain hash.
    async fn wait_for_hash(&self, transaction_id: &str) -> Result<String, EngineError>;
}

pub struct EngineService {
    provider: RootProvider<Http<Client>>,
    http: reqwest::Client,
    base_url: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaitResponse {
    transaction_hash: String,
}

impl EngineService {
    pub fn new(rpc_url: &str, base_url: String, secret: String) -> Result<Self, EngineError> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse().map_err(|e| {
            EngineError::InvalidConfig(format!("invalid RPC URL: {}", e))
        })?);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            provider,
            http,
            base_url,
            secret,
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("{} request failed: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Upstream(format!(
                "{} error {}: {}",
                path, status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("{} bad response: {}", path, e)))
    }
}

#[async_trait]
impl ChainEngine for EngineService {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, EngineError> {
        let contract = IErc20::new(token, &self.provider);
        contract
            .balanceOf(owner)
            .call()
            .await
            .map(|r| r._0)
            .map_err(|e| EngineError::Upstream(format!("balanceOf query failed: {}", e)))
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, EngineError> {
        self.provider
            .get_balance(owner)
            .await
            .map_err(|e| EngineError::Upstream(format!("balance query failed: {}", e)))
    }

    async fn sign_typed_data(
        &self,
        from: Address,
        typed_data: Value,
    ) -> Result<String, EngineError> {
        let response: SignResponse = self
            .post(
                "/sign-typed-data",
                json!({ "from": from.to_string(), "typedData": typed_data }),
            )
            .await?;
        Ok(response.signature)
    }

    async fn transfer(
        &self,
        from: Address,
        token: Address,
        to: Address,
        amount_raw: U256,
    ) -> Result<String, EngineError> {
        let response: TransferResponse = self
            .post(
                "/erc20/transfer",
                json!({
                    "from": from.to_string(),
                    "contract": token.to_string(),
                    "to": to.to_string(),
                    "amount": amount_raw.to_string(),
                }),
            )
            .await?;
        Ok(response.transaction_id)
    }

    async fn wait_for_hash(&self, transaction_id: &str) -> Result<String, EngineError> {
        let url = format!("{}/transactions/{}/wait", self.base_url, transaction_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("wait request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Upstream(format!(
                "wait error {}: {}",
                status, text
            )));
        }

        let body: WaitResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Upstream(format!("wait bad response: {}", e)))?;
        Ok(body.transaction_hash)
    }
}
