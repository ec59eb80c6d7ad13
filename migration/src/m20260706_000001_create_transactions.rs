//! Migration to create the transactions table
//!
//! One row per money-movement attempt; status only moves
//! pending -> settled or pending -> failed.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(uuid(Transactions::Id).primary_key())
                    .col(uuid(Transactions::WalletId))
                    .col(uuid_null(Transactions::ApiKeyId))
                    .col(string(Transactions::TransactionType))
                    .col(string(Transactions::Status))
                    .col(decimal_len(Transactions::AmountUsdc, 20, 6))
                    .col(text_null(Transactions::TxHash))
                    .col(text_null(Transactions::ProductId))
                    .col(text_null(Transactions::ProductName))
                    .col(text_null(Transactions::StoreUrl))
                    .col(text_null(Transactions::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Transactions::InitiatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Transactions::SettledAt))
                    .col(
                        timestamp_with_time_zone(Transactions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_wallet_status")
                    .table(Transactions::Table)
                    .col(Transactions::WalletId)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_wallet_created")
                    .table(Transactions::Table)
                    .col(Transactions::WalletId)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Covers the daily-spent aggregate (agent credential + status + day window)
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_api_key_status_created")
                    .table(Transactions::Table)
                    .col(Transactions::ApiKeyId)
                    .col(Transactions::Status)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Transactions {
    Table,
    Id,
    WalletId,
    ApiKeyId,
    TransactionType,
    Status,
    AmountUsdc,
    TxHash,
    ProductId,
    ProductName,
    StoreUrl,
    ErrorMessage,
    InitiatedAt,
    SettledAt,
    CreatedAt,
}
