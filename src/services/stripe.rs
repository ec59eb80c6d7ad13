//! Minimal card-network API client: crypto-funded payment intents routed to
//! a merchant connected account.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

#[derive(Debug)]
pub enum StripeError {
    Http(String),
    Api { status: u16, message: String },
}

impl std::fmt::Display for StripeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StripeError::Http(msg) => write!(f, "stripe request failed: {}", msg),
            StripeError::Api { status, message } => {
                write!(f, "stripe API error {}: {}", status, message)
            }
        }
    }
}

impl std::error::Error for StripeError {}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoDepositAddress {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoDepositDetails {
    #[serde(default)]
    pub deposit_addresses: HashMap<String, CryptoDepositAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextAction {
    #[serde(default)]
    pub crypto_collect_deposit_details: Option<CryptoDepositDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub next_action: Option<NextAction>,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            secret_key,
            base_url,
        }
    }

    /// Create and confirm a crypto payment intent whose funds transfer to the
    /// merchant's connected account.
    pub async fn create_crypto_payment_intent(
        &self,
        amount_cents: i64,
        destination: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let amount = amount_cents.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", "usd"),
            ("payment_method_types[]", "crypto"),
            ("payment_method_data[type]", "crypto"),
            ("payment_method_options[crypto][mode]", "custom"),
            ("confirm", "true"),
            ("transfer_data[destination]", destination),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| StripeError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| StripeError::Http(e.to_string()))
    }

    pub async fn cancel_payment_intent(&self, payment_intent_id: &str) -> Result<(), StripeError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{}/cancel",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| StripeError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api { status, message });
        }

        Ok(())
    }
}
