mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use projbot_core::config::{AppConfig, LoadOptions};

const SESSION_REAPER_INTERVAL: Duration = Duration::from_secs(300);

fn init_logging(config: &AppConfig) {
    use projbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    spawn_session_reaper(app.runtime.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        operations = app.runtime.catalog().len(),
        "projbot-server started"
    );

    let router = routes::router(routes::AppState::from_application(&app));
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "projbot-server stopping");
    Ok(())
}

fn spawn_session_reaper(runtime: std::sync::Arc<projbot_agent::runtime::AgentRuntime>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_REAPER_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = runtime.evict_idle_sessions().await;
            if evicted > 0 {
                tracing::info!(
                    event_name = "system.sessions.evicted",
                    count = evicted,
                    "idle sessions evicted"
                );
            }
        }
    });
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
