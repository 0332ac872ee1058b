//! Ledger Core gateway
//!
//! ```text
//! ledger_core [--env dev] [--port 8080] [--memory]
//! ```
//!
//! Loads `config/{env}.yaml`, opens PostgreSQL when `postgres_url` is set
//! (unless `--memory`), and serves the HTTP API.

use std::sync::Arc;

use anyhow::Context;

use ledger_core::config::AppConfig;
use ledger_core::db::Database;
use ledger_core::gateway::{self, state::AppState};
use ledger_core::oracle::HttpPriceOracle;
use ledger_core::store::{Backend, MemoryStore, PgStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_memory_store() -> bool {
    std::env::args().any(|a| a == "--memory")
}

async fn open_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn Backend>> {
    match (&config.postgres_url, use_memory_store()) {
        (Some(url), false) => {
            let db = Database::connect(url)
                .await
                .context("connecting to PostgreSQL")?;
            db.init_schema().await.context("initializing schema")?;
            db.health_check().await.context("PostgreSQL health check")?;
            Ok(Arc::new(PgStore::new(db.pool().clone())))
        }
        _ => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("loading {} config", env))?;
    let _log_guard =
        ledger_core::logging::init_logging(&config).context("initializing log files")?;

    tracing::info!(env = %env, version = env!("GIT_HASH"), "Starting Ledger Core");

    let backend = open_backend(&config).await?;
    let oracle = HttpPriceOracle::new(config.oracle.clone()).context("building oracle client")?;
    let state = Arc::new(AppState::new(
        backend,
        Arc::new(oracle),
        config.oracle.asset_id.clone(),
        config.swap.clone(),
    ));

    let port = get_port_override().unwrap_or(config.gateway.port);
    gateway::run_server(&config.gateway.host, port, state)
        .await
        .with_context(|| format!("serving on {}:{}", config.gateway.host, port))
}
