//! Migration to create the wallets table
//!
//! One active custodial address per user; deactivation is a soft flag.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(uuid(Wallets::Id).primary_key())
                    .col(uuid(Wallets::UserId))
                    .col(string(Wallets::Address).unique_key())
                    .col(integer(Wallets::ChainId))
                    .col(string(Wallets::Label).default("default"))
                    .col(string(Wallets::EngineId))
                    .col(boolean(Wallets::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(Wallets::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Wallets::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for resolving a user's active wallet
        manager
            .create_index(
                Index::create()
                    .name("idx_wallets_user_active")
                    .table(Wallets::Table)
                    .col(Wallets::UserId)
                    .col(Wallets::IsActive)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Wallets {
    Table,
    Id,
    UserId,
    Address,
    ChainId,
    Label,
    EngineId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
