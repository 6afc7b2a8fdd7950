//! Service entry point: configuration, database, gateway channel, and the
//! axum server.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timberline::auth::SaltedSha2Authority;
use timberline::config::AppConfig;
use timberline::gateway::PayFastHttp;
use timberline::http::{router, AppState};
use timberline::services::{
    DiscountEngine, NotificationReconciler, OrderService, PaymentService, StockLedger,
};
use timberline::store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let store = Arc::new(PgStore::new(db));
    let orders = OrderService::new(
        store.clone(),
        StockLedger::new(store.clone()),
        DiscountEngine::new(store.clone()),
    );
    let channel = Arc::new(PayFastHttp::new(&config.payfast)?);
    let payments = PaymentService::new(
        store.clone(),
        orders.clone(),
        channel.clone(),
        config.payfast.clone(),
        config.frontend_base_url.clone(),
        config.backend_base_url.clone(),
    );
    let reconciler =
        NotificationReconciler::new(store.clone(), channel, config.payfast.clone());
    let state = AppState {
        store,
        auth: Arc::new(SaltedSha2Authority::new(config.token_secret.clone())),
        orders,
        payments,
        reconciler,
    };

    let app = router(state);

    tracing::info!("🚀 Timberline commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?,
        app,
    )
    .await?;
    Ok(())
}
