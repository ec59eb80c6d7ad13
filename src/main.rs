use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agentpay_backend::config::{Config, SettlementMode};
use agentpay_backend::services::engine::{ChainEngine, EngineService};
use agentpay_backend::services::payment::{
    FacilitatorSettlement, SettlementStrategy, StripeSettlement,
};
use agentpay_backend::services::purchase::PurchaseService;
use agentpay_backend::services::shopify::{OrderAdapter, ProductCatalog, ShopifyService};
use agentpay_backend::services::stripe::StripeClient;
use agentpay_backend::{handlers, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agentpay_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env().expect("invalid configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let engine: Arc<dyn ChainEngine> = Arc::new(
        EngineService::new(
            &config.rpc_url,
            config.engine_url.clone(),
            config.engine_secret.clone(),
        )
        .expect("Failed to construct chain engine"),
    );

    let shopify = Arc::new(ShopifyService::new(
        &config.shop_domain,
        config.shop_access_token.clone(),
        config.shop_storefront_token.clone(),
    ));
    let catalog: Arc<dyn ProductCatalog> = shopify.clone();
    let orders: Arc<dyn OrderAdapter> = shopify;

    let settlement: Arc<dyn SettlementStrategy> = match config.settlement_mode {
        SettlementMode::Facilitator => {
            let facilitator_url = config
                .facilitator_url
                .clone()
                .expect("FACILITATOR_URL must be set in facilitator mode");
            let pay_to = config
                .settlement_address
                .as_deref()
                .and_then(|address| alloy::primitives::Address::from_str(address).ok())
                .expect("SETTLEMENT_ADDRESS must be a valid address in facilitator mode");
            Arc::new(FacilitatorSettlement::new(
                engine.clone(),
                facilitator_url,
                pay_to,
                config.chain.clone(),
            ))
        }
        SettlementMode::Stripe => {
            let secret_key = config
                .stripe_secret_key
                .clone()
                .expect("STRIPE_SECRET_KEY must be set in stripe mode");
            Arc::new(StripeSettlement::new(
                engine.clone(),
                StripeClient::new(secret_key),
                config.stripe_account_id.clone(),
                config.chain.clone(),
            ))
        }
    };

    let purchase = PurchaseService::new(
        db.clone(),
        engine.clone(),
        catalog,
        orders,
        settlement,
        config.chain.clone(),
        config.store_url(),
    );

    let state = AppState {
        db,
        engine,
        chain: config.chain.clone(),
        purchase,
    };

    // Build router
    let app = Router::new()
        .route("/", get(hello_agentpay))
        .route("/api/purchase", post(handlers::purchase::purchase))
        .route(
            "/api/wallets/{wallet_id}/balance",
            get(handlers::wallet::get_balance),
        )
        .route(
            "/api/wallets/{wallet_id}/transactions",
            get(handlers::transaction::list_transactions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind listener");

    tracing::info!(
        "Server listening on {}",
        listener
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    );

    axum::serve(listener, app).await.expect("Server error");
}

async fn hello_agentpay() -> &'static str {
    "agentpay backend"
}
