use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    pub price_usdc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price_usdc: String,
    pub images: Vec<String>,
    pub variants: Vec<ProductVariant>,
}
