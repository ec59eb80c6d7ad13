//! Purchase orchestration.
//!
//! Sequences pricing, the serializable reservation (balance check, spending
//! evaluation, pending transaction insert), settlement, and merchant order
//! creation, with partial-failure handling at each stage. Money movement,
//! not merchant-order bookkeeping, defines purchase success.

use alloy::primitives::Address;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, DbErr, IsolationLevel,
    TransactionTrait,
};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ChainConfig;
use crate::entities::{orders, transactions};
use crate::models::product::ProductDetail;
use crate::models::purchase::{PurchaseRequest, PurchaseResult, PurchasedProduct};
use crate::models::status::{OrderStatus, TransactionStatus, TransactionType};
use crate::services::engine::ChainEngine;
use crate::services::payment::{PaymentError, SettlementStrategy};
use crate::services::shopify::{
    CatalogError, CreateOrderParams, OrderAdapter, ProductCatalog,
};
use crate::services::spending::{self, DenialCode, SpendingError, SpendingEvaluation};
use crate::services::usdc_math::{self, AmountError};
use crate::services::wallet::{self, WalletError};

const RESERVE_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug)]
pub enum PurchaseError {
    Validation(String),
    InsufficientBalance {
        available: String,
        required: String,
    },
    SpendingLimitExceeded {
        period: &'static str,
        limit: String,
        spent: String,
        requested: String,
    },
    PaymentFailed {
        message: String,
        retriable: bool,
    },
    ProductNotFound(String),
    WalletNotFound(Uuid),
    PolicyNotFound(Uuid),
    Upstream(String),
    Database(DbErr),
    Internal(String),
}

impl PurchaseError {
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::Validation(_) => "VALIDATION_ERROR",
            PurchaseError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            PurchaseError::SpendingLimitExceeded { .. } => "SPENDING_LIMIT_EXCEEDED",
            PurchaseError::PaymentFailed { .. } => "PAYMENT_FAILED",
            PurchaseError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            PurchaseError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            PurchaseError::PolicyNotFound(_) => "POLICY_NOT_FOUND",
            PurchaseError::Upstream(_) => "UPSTREAM_UNAVAILABLE",
            PurchaseError::Database(_) => "DATABASE_ERROR",
            PurchaseError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retriable(&self) -> bool {
        match self {
            PurchaseError::PaymentFailed { retriable, .. } => *retriable,
            PurchaseError::Upstream(_) | PurchaseError::Database(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurchaseError::Validation(msg) => write!(f, "{}", msg),
            PurchaseError::InsufficientBalance { available, required } => {
                write!(f, "Insufficient balance: have {}, need {}", available, required)
            }
            PurchaseError::SpendingLimitExceeded {
                period,
                limit,
                spent,
                requested,
            } => write!(
                f,
                "Spending limit exceeded: {} limit is {}, already spent {}, requested {}",
                period, limit, spent, requested
            ),
            PurchaseError::PaymentFailed { message, .. } => write!(f, "{}", message),
            PurchaseError::ProductNotFound(id) => write!(f, "Product {} not found", id),
            PurchaseError::WalletNotFound(id) => write!(f, "Wallet {} not found", id),
            PurchaseError::PolicyNotFound(id) => {
                write!(f, "No active spending policy found for agent key {}", id)
            }
            PurchaseError::Upstream(msg) => write!(f, "{}", msg),
            PurchaseError::Database(err) => write!(f, "database error: {}", err),
            PurchaseError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PurchaseError {}

impl From<DbErr> for PurchaseError {
    fn from(err: DbErr) -> Self {
        PurchaseError::Database(err)
    }
}

impl From<AmountError> for PurchaseError {
    fn from(err: AmountError) -> Self {
        PurchaseError::Validation(err.to_string())
    }
}

impl From<WalletError> for PurchaseError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotFound(id) => PurchaseError::WalletNotFound(id),
            WalletError::InvalidAddress(address) => {
                PurchaseError::Internal(format!("wallet has invalid address: {}", address))
            }
            WalletError::Upstream(msg) => PurchaseError::Upstream(msg),
            WalletError::Database(err) => PurchaseError::Database(err),
        }
    }
}

impl From<SpendingError> for PurchaseError {
    fn from(err: SpendingError) -> Self {
        match err {
            SpendingError::PolicyNotFound(id) => PurchaseError::PolicyNotFound(id),
            SpendingError::InvalidAmount(amount) => {
                PurchaseError::Validation(format!("invalid amount: {}", amount))
            }
            SpendingError::Database(err) => PurchaseError::Database(err),
        }
    }
}

impl From<CatalogError> for PurchaseError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ProductNotFound(id) => PurchaseError::ProductNotFound(id),
            CatalogError::Upstream(msg) => PurchaseError::Upstream(msg),
        }
    }
}

fn is_serialization_failure(err: &DbErr) -> bool {
    err.to_string().contains("could not serialize access")
}

fn resolve_price(
    product: &ProductDetail,
    variant_id: Option<&str>,
    quantity: u32,
) -> Result<(String, String), PurchaseError> {
    let unit_price = match variant_id {
        Some(variant_id) => product
            .variants
            .iter()
            .find(|v| v.id == variant_id)
            .map(|v| v.price_usdc.clone())
            .ok_or_else(|| {
                PurchaseError::Validation(format!(
                    "Variant {} not found on product {}",
                    variant_id, product.id
                ))
            })?,
        None => product.price_usdc.clone(),
    };
    let total = usdc_math::multiply_usdc(&unit_price, quantity)?;
    Ok((unit_price, total))
}

#[derive(Clone)]
pub struct PurchaseService {
    db: DatabaseConnection,
    engine: Arc<dyn ChainEngine>,
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderAdapter>,
    settlement: Arc<dyn SettlementStrategy>,
    chain: ChainConfig,
    store_url: String,
}

impl PurchaseService {
    pub fn new(
        db: DatabaseConnection,
        engine: Arc<dyn ChainEngine>,
        catalog: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderAdapter>,
        settlement: Arc<dyn SettlementStrategy>,
        chain: ChainConfig,
        store_url: String,
    ) -> Self {
        Self {
            db,
            engine,
            catalog,
            orders,
            settlement,
            chain,
            store_url,
        }
    }

    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseResult, PurchaseError> {
        if request.quantity == 0 {
            return Err(PurchaseError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let product = self.catalog.get_product(&request.product_id).await?;
        let (unit_price, total_usdc) =
            resolve_price(&product, request.variant_id.as_deref(), request.quantity)?;

        let (tx_row, from_address) = self.reserve(&request, &product, &total_usdc).await?;

        info!(
            transaction_id = %tx_row.id,
            amount_usdc = %total_usdc,
            strategy = self.settlement.name(),
            "purchase reserved, settling"
        );

        // Once the pending row is committed the settlement must run to
        // completion; spawning detaches it from the caller's cancellation.
        let service = self.clone();
        let handle = tokio::spawn(async move {
            service
                .settle_and_record(request, product, unit_price, total_usdc, tx_row, from_address)
                .await
        });
        handle
            .await
            .map_err(|e| PurchaseError::Internal(format!("settlement task aborted: {}", e)))?
    }

    /// Balance check, spending evaluation, and the pending insert, all under
    /// serializable isolation so two concurrent purchases cannot both pass
    /// the daily-limit check against the same stale total.
    async fn reserve(
        &self,
        request: &PurchaseRequest,
        product: &ProductDetail,
        total_usdc: &str,
    ) -> Result<(transactions::Model, Address), PurchaseError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let txn = self
                .db
                .begin_with_config(Some(IsolationLevel::Serializable), None)
                .await?;

            match self.try_reserve(&txn, request, product, total_usdc).await {
                Ok(reserved) => match txn.commit().await {
                    Ok(()) => return Ok(reserved),
                    Err(err) if is_serialization_failure(&err) && attempt < RESERVE_MAX_ATTEMPTS => {
                        warn!(attempt, "serialization conflict committing reservation, retrying");
                    }
                    Err(err) => return Err(err.into()),
                },
                Err(err) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        warn!(error = %rollback_err, "reservation rollback failed");
                    }
                    match &err {
                        PurchaseError::Database(db_err)
                            if is_serialization_failure(db_err)
                                && attempt < RESERVE_MAX_ATTEMPTS =>
                        {
                            warn!(attempt, "serialization conflict during reservation, retrying");
                        }
                        _ => return Err(err),
                    }
                }
            }
        }
    }

    async fn try_reserve(
        &self,
        txn: &DatabaseTransaction,
        request: &PurchaseRequest,
        product: &ProductDetail,
        total_usdc: &str,
    ) -> Result<(transactions::Model, Address), PurchaseError> {
        let (from_address, _wallet) = wallet::get_address(txn, request.wallet_id).await?;

        let balance =
            wallet::balance_of_address(self.engine.as_ref(), &self.chain, from_address).await?;
        if usdc_math::compare_usdc(&balance, total_usdc)? == Ordering::Less {
            return Err(PurchaseError::InsufficientBalance {
                available: balance,
                required: total_usdc.to_string(),
            });
        }

        match spending::evaluate(txn, request.api_key_id, total_usdc).await? {
            SpendingEvaluation::Allowed => {}
            SpendingEvaluation::Denied(denial) => {
                return Err(PurchaseError::SpendingLimitExceeded {
                    period: match denial.code {
                        DenialCode::PerTxExceeded => "per-transaction",
                        DenialCode::DailyLimitExceeded => "daily",
                    },
                    limit: denial.limit,
                    spent: denial.current,
                    requested: denial.requested,
                });
            }
        }

        let amount = Decimal::from_str(total_usdc)
            .map_err(|_| PurchaseError::Validation(format!("invalid amount: {}", total_usdc)))?;
        let now = Utc::now();
        let row = transactions::ActiveModel {
            id: Set(Uuid::new_v4()),
            wallet_id: Set(request.wallet_id),
            api_key_id: Set(Some(request.api_key_id)),
            transaction_type: Set(TransactionType::Purchase.as_str().to_string()),
            status: Set(TransactionStatus::Pending.as_str().to_string()),
            amount_usdc: Set(amount),
            tx_hash: Set(None),
            payment_reference: Set(None),
            product_id: Set(Some(product.id.clone())),
            product_name: Set(Some(product.title.clone())),
            store_url: Set(Some(self.store_url.clone())),
            error_message: Set(None),
            initiated_at: Set(now.into()),
            settled_at: Set(None),
            created_at: Set(now.into()),
        }
        .insert(txn)
        .await?;

        Ok((row, from_address))
    }

    async fn settle_and_record(
        &self,
        request: PurchaseRequest,
        product: ProductDetail,
        unit_price: String,
        total_usdc: String,
        tx_row: transactions::Model,
        from_address: Address,
    ) -> Result<PurchaseResult, PurchaseError> {
        let settlement = match self.settlement.settle(from_address, &total_usdc).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let (message, retriable) = match err {
                    PaymentError::Failed { message, retriable } => (message, retriable),
                    PaymentError::InvalidAmount(amount) => {
                        (format!("invalid amount: {}", amount), false)
                    }
                };
                let update = transactions::ActiveModel {
                    id: Set(tx_row.id),
                    status: Set(TransactionStatus::Failed.as_str().to_string()),
                    error_message: Set(Some(message.clone())),
                    ..Default::default()
                };
                if let Err(db_err) = update.update(&self.db).await {
                    error!(
                        transaction_id = %tx_row.id,
                        error = %db_err,
                        "failed to record settlement failure"
                    );
                }
                return Err(PurchaseError::PaymentFailed { message, retriable });
            }
        };

        let update = transactions::ActiveModel {
            id: Set(tx_row.id),
            status: Set(TransactionStatus::Settled.as_str().to_string()),
            tx_hash: Set(Some(settlement.tx_hash.clone())),
            payment_reference: Set(Some(settlement.payment_reference.clone())),
            settled_at: Set(Some(settlement.settled_at.into())),
            ..Default::default()
        };
        if let Err(db_err) = update.update(&self.db).await {
            // Money has moved but the row still says pending; reconciliation
            // is out of band, keyed on the payment reference.
            error!(
                transaction_id = %tx_row.id,
                tx_hash = %settlement.tx_hash,
                payment_reference = %settlement.payment_reference,
                error = %db_err,
                "failed to update transaction to settled"
            );
        }

        let mut merchant_order_id = None;
        let mut order_number = None;
        let mut order_status = OrderStatus::Created;
        let mut order_error = None;

        match self
            .orders
            .create_order(CreateOrderParams {
                product_title: product.title.clone(),
                variant_id: request.variant_id.clone(),
                quantity: request.quantity,
                price_usdc: unit_price.clone(),
                total_usdc: total_usdc.clone(),
                payment_reference: settlement.payment_reference.clone(),
            })
            .await
        {
            Ok(created) => {
                merchant_order_id = Some(created.merchant_order_id);
                order_number = Some(created.order_number);
            }
            Err(err) => {
                order_status = OrderStatus::Failed;
                order_error = Some(err.to_string());
                error!(
                    transaction_id = %tx_row.id,
                    tx_hash = %settlement.tx_hash,
                    error = %err,
                    "order creation failed (non-fatal)"
                );
            }
        }

        let now = Utc::now();
        let order_row = orders::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_id: Set(tx_row.id),
            wallet_id: Set(request.wallet_id),
            merchant_order_id: Set(merchant_order_id.clone()),
            order_number: Set(order_number.clone()),
            status: Set(order_status.as_str().to_string()),
            product_id: Set(product.id.clone()),
            product_name: Set(product.title.clone()),
            variant_id: Set(request.variant_id.clone()),
            quantity: Set(request.quantity as i32),
            unit_price_usdc: Set(Decimal::from_str(&unit_price).unwrap_or_default()),
            total_usdc: Set(Decimal::from_str(&total_usdc).unwrap_or_default()),
            store_url: Set(self.store_url.clone()),
            error_message: Set(order_error),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        if let Err(db_err) = order_row.insert(&self.db).await {
            error!(
                transaction_id = %tx_row.id,
                error = %db_err,
                "failed to insert order record"
            );
        }

        Ok(PurchaseResult {
            transaction_id: tx_row.id,
            tx_hash: settlement.tx_hash,
            order_id: merchant_order_id,
            order_number,
            product: PurchasedProduct {
                id: product.id,
                name: product.title,
                variant_id: request.variant_id,
            },
            amount: total_usdc,
            status: TransactionStatus::Settled.as_str().to_string(),
        })
    }
}
