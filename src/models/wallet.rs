use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub wallet_id: Uuid,
    pub address: String,
    pub chain_id: i32,
    pub balance: String,
}
