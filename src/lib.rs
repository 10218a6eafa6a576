pub mod error;
pub mod models;
pub mod modules;
pub mod proxy; // Gateway service module
mod utils;

use modules::logger;
use std::sync::Arc;
use tracing::info;

use crate::error::AppError;
use crate::proxy::health::{collect_usable, HttpProbe};
use crate::proxy::session_pool::parse_session_specs;
use crate::proxy::{AxumServer, SessionPool};

/// Load config, filter proxies, build the pool and serve until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Initialize logger
    logger::init_logger();

    let config = modules::load_app_config();
    config.log_summary();

    let sessions = parse_session_specs(&config.sessions);
    if sessions.is_empty() {
        return Err(AppError::EmptyPool.into());
    }

    // Probe proxies before anything is served
    let probe = HttpProbe::from_config(&config.proxy.health_check);
    let usable_proxies = collect_usable(config.proxies.clone(), &probe).await;

    let pool = Arc::new(SessionPool::new(sessions, usable_proxies));
    pool.ensure_not_empty()?;
    info!(
        "Session pool ready: {} sessions, {} proxies, max retry count {}",
        pool.len(),
        pool.proxies().len(),
        pool.retry_budget()
    );

    let (server, handle) = AxumServer::start(&config.proxy, pool)
        .await
        .map_err(anyhow::Error::msg)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop();
    handle.await.ok();

    Ok(())
}
