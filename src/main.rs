use std::net::SocketAddr;
use std::sync::Arc;

use affiliate_ledger::{AppState, Config, MemoryStore, PgStore, init_pool, init_router};
use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let state = match config.database_url.as_deref() {
        Some(url) => {
            let store = Arc::new(PgStore::new(init_pool(url).await?));
            AppState::new(store.clone(), store, config.clone())
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            let store = Arc::new(MemoryStore::new());
            AppState::new(store.clone(), store, config.clone())
        }
    };
    if state.admins.is_empty() {
        warn!("AFFILIATE_ADMIN_EMAILS is empty, nobody can see the admin report");
    }

    let addr: SocketAddr = ([0, 0, 0, 0], config.server_port).into();
    let listener = TcpListener::bind(addr).await?;
    let app = init_router(state);

    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
