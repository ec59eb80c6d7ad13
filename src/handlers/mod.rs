pub mod purchase;
pub mod transaction;
pub mod wallet;
