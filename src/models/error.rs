//! Wire shape for errors plus the single place error tags are translated
//! into transport-level status codes.

use axum::http::StatusCode;
use serde::Serialize;

use crate::services::purchase::PurchaseError;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    pub retriable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

pub fn status_for(code: &str) -> StatusCode {
    match code {
        "INSUFFICIENT_BALANCE" => StatusCode::BAD_REQUEST,
        "SPENDING_LIMIT_EXCEEDED" => StatusCode::FORBIDDEN,
        "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "PRODUCT_NOT_FOUND" => StatusCode::NOT_FOUND,
        "WALLET_NOT_FOUND" => StatusCode::NOT_FOUND,
        "POLICY_NOT_FOUND" => StatusCode::NOT_FOUND,
        "PAYMENT_FAILED" => StatusCode::BAD_GATEWAY,
        "ORDER_CREATION_FAILED" => StatusCode::BAD_GATEWAY,
        "UPSTREAM_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        "DATABASE_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ErrorResponse {
    pub fn from_purchase_error(err: &PurchaseError) -> (StatusCode, ErrorResponse) {
        let code = err.code();
        (
            status_for(code),
            ErrorResponse {
                error: ErrorDetail {
                    code,
                    message: err.to_string(),
                    retriable: err.retriable(),
                },
            },
        )
    }
}
