pub use super::orders::Entity as Orders;
pub use super::spending_policies::Entity as SpendingPolicies;
pub use super::transactions::Entity as Transactions;
pub use super::wallets::Entity as Wallets;
