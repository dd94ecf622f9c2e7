use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arkive_tenantdb::{app, config::Config, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let state = AppState::new(config);

    state.tenants.provisioner().ping().await?;
    info!("Database server reachable");

    if state.config.warm_tenants_on_startup {
        db::warm_existing_tenants(&state.tenants).await?;
    }

    match state.config.tenant_cache_capacity {
        Some(cap) => info!("Tenant cache bounded to {cap} handle(s)"),
        None => info!("Tenant cache unbounded"),
    }

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let router = app(state);
    info!("arkive tenant API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
