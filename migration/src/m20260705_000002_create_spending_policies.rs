//! Migration to create the spending_policies table
//!
//! One active policy per agent credential, superseded by deactivation.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SpendingPolicies::Table)
                    .if_not_exists()
                    .col(uuid(SpendingPolicies::Id).primary_key())
                    .col(uuid(SpendingPolicies::WalletId))
                    .col(uuid(SpendingPolicies::ApiKeyId))
                    .col(string_null(SpendingPolicies::Name))
                    .col(decimal_len(SpendingPolicies::MaxPerTx, 20, 6))
                    .col(decimal_len(SpendingPolicies::DailyLimit, 20, 6))
                    .col(decimal_len_null(SpendingPolicies::MonthlyLimit, 20, 6))
                    .col(json_binary_null(SpendingPolicies::AllowedMerchants))
                    .col(boolean(SpendingPolicies::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(SpendingPolicies::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(SpendingPolicies::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One policy per agent credential
        manager
            .create_index(
                Index::create()
                    .name("idx_spending_policies_api_key")
                    .table(SpendingPolicies::Table)
                    .col(SpendingPolicies::ApiKeyId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SpendingPolicies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SpendingPolicies {
    Table,
    Id,
    WalletId,
    ApiKeyId,
    Name,
    MaxPerTx,
    DailyLimit,
    MonthlyLimit,
    AllowedMerchants,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
