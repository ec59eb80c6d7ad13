//! String-backed status and type enums shared between entities and services.
//!
//! Entity columns store the wire strings; services compare through these
//! enums so a typo cannot split the state space.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Purchase,
    Fund,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Fund => "fund",
            TransactionType::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Settling,
    Settled,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Settling => "settling",
            TransactionStatus::Settled => "settled",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Confirmed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }
}
