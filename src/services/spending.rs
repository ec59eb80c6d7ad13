//! Spending policy evaluator.
//!
//! Enforces the per-transaction cap and the daily limit over settled spend
//! since UTC midnight (calendar-day window, not a rolling 24h one). Callers
//! pass their own connection so the reads share the reservation
//! transaction's isolation scope.

use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::entities::{prelude::*, spending_policies, transactions};
use crate::models::status::TransactionStatus;
use crate::services::usdc_math::parse_usdc;

#[derive(Debug)]
pub enum SpendingError {
    PolicyNotFound(Uuid),
    InvalidAmount(String),
    Database(DbErr),
}

impl std::fmt::Display for SpendingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpendingError::PolicyNotFound(id) => {
                write!(f, "No active spending policy found for agent key {}", id)
            }
            SpendingError::InvalidAmount(amount) => write!(f, "invalid amount: {}", amount),
            SpendingError::Database(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for SpendingError {}

impl From<DbErr> for SpendingError {
    fn from(err: DbErr) -> Self {
        SpendingError::Database(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialCode {
    PerTxExceeded,
    DailyLimitExceeded,
}

impl DenialCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialCode::PerTxExceeded => "PER_TX_EXCEEDED",
            DenialCode::DailyLimitExceeded => "DAILY_LIMIT_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpendingDenial {
    pub code: DenialCode,
    pub limit: String,
    pub current: String,
    pub requested: String,
}

#[derive(Debug, Clone)]
pub enum SpendingEvaluation {
    Allowed,
    Denied(SpendingDenial),
}

pub async fn get_policy<C: ConnectionTrait>(
    conn: &C,
    api_key_id: Uuid,
) -> Result<spending_policies::Model, SpendingError> {
    SpendingPolicies::find()
        .filter(spending_policies::Column::ApiKeyId.eq(api_key_id))
        .filter(spending_policies::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or(SpendingError::PolicyNotFound(api_key_id))
}

/// Sum of settled spend for this agent credential since UTC midnight.
pub async fn get_daily_spent<C: ConnectionTrait>(
    conn: &C,
    api_key_id: Uuid,
) -> Result<String, SpendingError> {
    let start_of_day = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

    let total: Option<Option<Decimal>> = Transactions::find()
        .select_only()
        .column_as(transactions::Column::AmountUsdc.sum(), "total")
        .filter(transactions::Column::ApiKeyId.eq(api_key_id))
        .filter(transactions::Column::Status.eq(TransactionStatus::Settled.as_str()))
        .filter(transactions::Column::CreatedAt.gte(start_of_day))
        .into_tuple()
        .one(conn)
        .await?;

    Ok(total
        .flatten()
        .map(|total| total.to_string())
        .unwrap_or_else(|| "0".to_string()))
}

pub async fn evaluate<C: ConnectionTrait>(
    conn: &C,
    api_key_id: Uuid,
    amount_usdc: &str,
) -> Result<SpendingEvaluation, SpendingError> {
    let amount = parse_usdc(amount_usdc)
        .map_err(|_| SpendingError::InvalidAmount(amount_usdc.to_string()))?;
    if amount <= 0 {
        return Err(SpendingError::InvalidAmount(amount_usdc.to_string()));
    }

    let policy = get_policy(conn, api_key_id).await?;

    let max_per_tx = policy.max_per_tx.to_string();
    let max_per_tx_raw =
        parse_usdc(&max_per_tx).map_err(|_| SpendingError::InvalidAmount(max_per_tx.clone()))?;
    if amount > max_per_tx_raw {
        return Ok(SpendingEvaluation::Denied(SpendingDenial {
            code: DenialCode::PerTxExceeded,
            limit: max_per_tx,
            current: "0".to_string(),
            requested: amount_usdc.to_string(),
        }));
    }

    let daily_spent = get_daily_spent(conn, api_key_id).await?;
    let spent_raw =
        parse_usdc(&daily_spent).map_err(|_| SpendingError::InvalidAmount(daily_spent.clone()))?;
    let daily_limit = policy.daily_limit.to_string();
    let daily_limit_raw =
        parse_usdc(&daily_limit).map_err(|_| SpendingError::InvalidAmount(daily_limit.clone()))?;

    if spent_raw + amount > daily_limit_raw {
        return Ok(SpendingEvaluation::Denied(SpendingDenial {
            code: DenialCode::DailyLimitExceeded,
            limit: daily_limit,
            current: daily_spent,
            requested: amount_usdc.to_string(),
        }));
    }

    Ok(SpendingEvaluation::Allowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::collections::BTreeMap;

    fn policy(max_per_tx: Decimal, daily_limit: Decimal) -> spending_policies::Model {
        let now = Utc::now().into();
        spending_policies::Model {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            api_key_id: Uuid::new_v4(),
            name: None,
            max_per_tx,
            daily_limit,
            monthly_limit: None,
            allowed_merchants: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn sum_row(total: Option<Decimal>) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([("total", Value::Decimal(total.map(Box::new)))])
    }

    #[tokio::test]
    async fn denies_above_per_tx_limit_regardless_of_daily_spend() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![policy(dec!(10.00), dec!(1000))]])
            .into_connection();

        let evaluation = evaluate(&db, Uuid::new_v4(), "10.000001").await.unwrap();
        match evaluation {
            SpendingEvaluation::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::PerTxExceeded);
                assert_eq!(denial.requested, "10.000001");
            }
            SpendingEvaluation::Allowed => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn denies_when_daily_total_would_exceed_limit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![policy(dec!(100), dec!(50))]])
            .append_query_results([vec![sum_row(Some(dec!(45.000000)))]])
            .into_connection();

        let evaluation = evaluate(&db, Uuid::new_v4(), "10").await.unwrap();
        match evaluation {
            SpendingEvaluation::Denied(denial) => {
                assert_eq!(denial.code, DenialCode::DailyLimitExceeded);
                assert_eq!(denial.current, "45.000000");
                assert_eq!(denial.limit, "50");
            }
            SpendingEvaluation::Allowed => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn allows_within_both_limits() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![policy(dec!(100), dec!(50))]])
            .append_query_results([vec![sum_row(None)]])
            .into_connection();

        let evaluation = evaluate(&db, Uuid::new_v4(), "30").await.unwrap();
        assert!(matches!(evaluation, SpendingEvaluation::Allowed));
    }

    #[tokio::test]
    async fn missing_policy_is_an_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results::<spending_policies::Model, _, _>([vec![]])
            .into_connection();

        let api_key_id = Uuid::new_v4();
        let err = evaluate(&db, api_key_id, "1").await.unwrap_err();
        assert!(matches!(err, SpendingError::PolicyNotFound(id) if id == api_key_id));
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        assert!(matches!(
            evaluate(&db, Uuid::new_v4(), "0").await,
            Err(SpendingError::InvalidAmount(_))
        ));
        assert!(matches!(
            evaluate(&db, Uuid::new_v4(), "nope").await,
            Err(SpendingError::InvalidAmount(_))
        ));
    }
}
