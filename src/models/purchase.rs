use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub wallet_id: Uuid,
    pub api_key_id: Uuid,
    pub product_id: String,
    pub variant_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchasedProduct {
    pub id: String,
    pub name: String,
    pub variant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResult {
    pub transaction_id: Uuid,
    pub tx_hash: String,
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub product: PurchasedProduct,
    pub amount: String,
    pub status: String,
}
