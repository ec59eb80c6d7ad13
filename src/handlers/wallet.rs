use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::models::error::ErrorResponse;
use crate::models::wallet::BalanceResponse;
use crate::services::purchase::PurchaseError;
use crate::services::wallet;
use crate::AppState;

pub async fn get_balance(
    State(state): State<AppState>,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let result = async {
        let (address, wallet) = wallet::get_address(&state.db, wallet_id).await?;
        let balance =
            wallet::balance_of_address(state.engine.as_ref(), &state.chain, address).await?;
        Ok::<_, PurchaseError>(BalanceResponse {
            wallet_id,
            address: wallet.address,
            chain_id: wallet.chain_id,
            balance,
        })
    }
    .await;

    match result {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            let (status, body) = ErrorResponse::from_purchase_error(&err);
            Err((status, Json(body)))
        }
    }
}
