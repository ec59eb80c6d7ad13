//! SeaORM Entity for the spending_policies table
//!
//! One active policy per agent credential; superseded, never hard-deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spending_policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub api_key_id: Uuid,
    pub name: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub max_per_tx: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))")]
    pub daily_limit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 6)))", nullable)]
    pub monthly_limit: Option<Decimal>,
    pub allowed_merchants: Option<Json>,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
