//! SeaORM Entity for the orders table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub merchant_order_id: Option<String>,
    pub order_number: Option<String>,
    pub status: String,
    pub product_id: String,
    pub product_name: String,
    pub variant_id: Option<String>,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub unit_price_usdc: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub total_usdc: Decimal,
    pub store_url: String,
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
