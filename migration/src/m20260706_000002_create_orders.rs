//! Migration to create the orders table
//!
//! At most one order per transaction; a failed order never rolls the
//! linked transaction back.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(uuid(Orders::Id).primary_key())
                    .col(uuid(Orders::TransactionId))
                    .col(uuid(Orders::WalletId))
                    .col(text_null(Orders::MerchantOrderId))
                    .col(text_null(Orders::OrderNumber))
                    .col(string(Orders::Status))
                    .col(text(Orders::ProductId))
                    .col(text(Orders::ProductName))
                    .col(text_null(Orders::VariantId))
                    .col(integer(Orders::Quantity).default(1))
                    .col(decimal_len(Orders::UnitPriceUsdc, 20, 6))
                    .col(decimal_len(Orders::TotalUsdc, 20, 6))
                    .col(text(Orders::StoreUrl))
                    .col(text_null(Orders::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Orders::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Orders::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 1:1 with transactions
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_transaction")
                    .table(Orders::Table)
                    .col(Orders::TransactionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_wallet")
                    .table(Orders::Table)
                    .col(Orders::WalletId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    TransactionId,
    WalletId,
    MerchantOrderId,
    OrderNumber,
    Status,
    ProductId,
    ProductName,
    VariantId,
    Quantity,
    UnitPriceUsdc,
    TotalUsdc,
    StoreUrl,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}
