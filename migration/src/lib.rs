pub use sea_orm_migration::prelude::*;

mod m20260705_000001_create_wallets;
mod m20260705_000002_create_spending_policies;
mod m20260706_000001_create_transactions;
mod m20260706_000002_create_orders;
mod m20260721_000001_add_payment_reference;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260705_000001_create_wallets::Migration),
            Box::new(m20260705_000002_create_spending_policies::Migration),
            Box::new(m20260706_000001_create_transactions::Migration),
            Box::new(m20260706_000002_create_orders::Migration),
            Box::new(m20260721_000001_add_payment_reference::Migration),
        ]
    }
}
