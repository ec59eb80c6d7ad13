//! SeaORM Entity for the transactions table
//!
//! One row per money-movement attempt. The amount is immutable once set;
//! status only moves pending -> settled or pending -> failed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub transaction_type: String,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub amount_usdc: Decimal,
    pub tx_hash: Option<String>,
    pub payment_reference: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub store_url: Option<String>,
    pub error_message: Option<String>,
    pub initiated_at: DateTimeWithTimeZone,
    pub settled_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
