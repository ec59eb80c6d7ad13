use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sea_orm::{ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::{prelude::*, transactions};
use crate::models::error::ErrorResponse;
use crate::services::purchase::PurchaseError;
use crate::AppState;

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<Vec<transactions::Model>>, (StatusCode, Json<ErrorResponse>)> {
    let rows = Transactions::find()
        .filter(transactions::Column::WalletId.eq(wallet_id))
        .order_by(transactions::Column::CreatedAt, Order::Desc)
        .all(&state.db)
        .await;

    match rows {
        Ok(rows) => Ok(Json(rows)),
        Err(err) => {
            let (status, body) = ErrorResponse::from_purchase_error(&PurchaseError::Database(err));
            Err((status, Json(body)))
        }
    }
}
