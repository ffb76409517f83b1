use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;

use student_registry::config::Config;
use student_registry::notify::BroadcastBus;
use student_registry::shutdown::shutdown_signal;
use student_registry::store::{MemoryStore, PgStore};
use student_registry::token::TokenService;
use student_registry::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let tokens = TokenService::new(config.jwt_secret.as_bytes(), config.token_ttl());
    let bus = Arc::new(BroadcastBus::new(config.event_buffer));

    let state = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("could not connect to PostgreSQL")?;
            log::info!("Using PostgreSQL store");
            AppState::new(Arc::new(store), tokens, bus.clone())
        }
        None => {
            log::warn!("DATABASE_URL not set, using in-memory store; data is lost on exit");
            AppState::new(Arc::new(MemoryStore::new()), tokens, bus.clone())
        }
    };

    let service = app(state, &config)?;

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {}", addr))?;
    log::info!("Starting student registry HTTP server on http://{}", addr);
    axum::serve(listener, service)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            bus.close();
        })
        .await?;
    Ok(())
}
