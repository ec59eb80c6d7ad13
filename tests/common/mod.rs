use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::env;

/// Connect to the test database, or None when TEST_DATABASE_URL is unset so
/// callers can skip live-DB tests in environments without Postgres.
pub async fn setup_test_db() -> Option<DatabaseConnection> {
    let database_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set, skipping live-DB test");
            return None;
        }
    };

    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to test DB");

    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations on test DB");

    Some(db)
}
