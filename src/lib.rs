// src/lib.rs

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use config::ChainConfig;
use services::engine::ChainEngine;
use services::purchase::PurchaseService;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub engine: Arc<dyn ChainEngine>,
    pub chain: ChainConfig,
    pub purchase: PurchaseService,
}

pub mod config;

pub mod entities {
    pub mod prelude;
    pub mod orders;
    pub mod spending_policies;
    pub mod transactions;
    pub mod wallets;
}

pub mod services {
    pub mod engine;
    pub mod payment;
    pub mod purchase;
    pub mod shopify;
    pub mod spending;
    pub mod stripe;
    pub mod usdc_math;
    pub mod wallet;
}

pub mod models;
pub mod handlers;
