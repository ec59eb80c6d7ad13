//! Balance oracle over the custody/chain layer.
//!
//! The balance read is a best-effort snapshot: it is not linearizable with
//! settlements that are in flight at the same moment.

use alloy::primitives::Address;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::ChainConfig;
use crate::entities::{prelude::*, wallets};
use crate::services::engine::ChainEngine;
use crate::services::usdc_math;

#[derive(Debug)]
pub enum WalletError {
    NotFound(Uuid),
    InvalidAddress(String),
    Upstream(String),
    Database(DbErr),
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletError::NotFound(id) => write!(f, "Wallet {} not found", id),
            WalletError::InvalidAddress(address) => {
                write!(f, "wallet has invalid address: {}", address)
            }
            WalletError::Upstream(msg) => write!(f, "balance query failed: {}", msg),
            WalletError::Database(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for WalletError {}

impl From<DbErr> for WalletError {
    fn from(err: DbErr) -> Self {
        WalletError::Database(err)
    }
}

pub async fn find_active_wallet<C: ConnectionTrait>(
    conn: &C,
    wallet_id: Uuid,
) -> Result<wallets::Model, WalletError> {
    Wallets::find()
        .filter(wallets::Column::Id.eq(wallet_id))
        .filter(wallets::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or(WalletError::NotFound(wallet_id))
}

pub async fn get_address<C: ConnectionTrait>(
    conn: &C,
    wallet_id: Uuid,
) -> Result<(Address, wallets::Model), WalletError> {
    let wallet = find_active_wallet(conn, wallet_id).await?;
    let address = Address::from_str(&wallet.address)
        .map_err(|_| WalletError::InvalidAddress(wallet.address.clone()))?;
    Ok((address, wallet))
}

/// Read the settled USDC balance of an address, formatted as an amount string.
pub async fn balance_of_address(
    engine: &dyn ChainEngine,
    chain: &ChainConfig,
    address: Address,
) -> Result<String, WalletError> {
    let raw = engine
        .balance_of(chain.usdc, address)
        .await
        .map_err(|e| WalletError::Upstream(e.to_string()))?;
    let raw = i128::try_from(raw)
        .map_err(|_| WalletError::Upstream(format!("balance out of range: {}", raw)))?;
    Ok(usdc_math::format_usdc(raw))
}

pub async fn get_balance<C: ConnectionTrait>(
    conn: &C,
    engine: &dyn ChainEngine,
    chain: &ChainConfig,
    wallet_id: Uuid,
) -> Result<String, WalletError> {
    let (address, _) = get_address(conn, wallet_id).await?;
    balance_of_address(engine, chain, address).await
}
