//! Fablab inventory server
//!
//! Usage:
//!   cargo run --bin seed_data -- --email ... --name ... --password ...   # first super admin
//!   cargo run --bin fablab-server                                        # start server
//!
//! Configuration comes from the environment or a `.env` file (see `config`).

use chrono::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use fablab_inventory::auth::TokenKeys;
use fablab_inventory::config::Config;
use fablab_inventory::logging::init_tracing;
use fablab_inventory::models::InventoryDocument;
use fablab_inventory::rest::create_router;
use fablab_inventory::storage::{read_seed, Storage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());
    if let Some(path) = &config.env_file {
        info!(path = %path.display(), "loaded .env");
    }

    let storage = Storage::open(&config.data_path)?;
    let seed = match &config.seed_file {
        Some(path) => read_seed(path)?,
        None => InventoryDocument::default(),
    };
    storage.init_inventory(&seed)?;
    if storage.count_administrators() == 0 {
        warn!("no administrator registered yet; run `seed_data` to create the first super admin");
    }

    let keys = TokenKeys::new(
        config.secret_key.as_bytes(),
        config.algorithm,
        Duration::minutes(config.token_ttl_minutes),
    );
    let app = create_router(storage.clone(), keys, config.bcrypt_cost);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "fablab inventory API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    storage.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
