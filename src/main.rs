use anyhow::Result;
use file_hub::config::{self, StoreBackend};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-hub with config: {:?}", cfg);

    // --- Handle migration mode ---
    if migrate {
        if cfg.backend == StoreBackend::Local {
            let store = file_hub::open_local_store(&cfg).await?;
            store.migrate().await?;
            tracing::info!("Database migration complete.");
        } else {
            tracing::info!("Backend {:?} keeps no local schema; nothing to migrate.", cfg.backend);
        }
        return Ok(()); // exit after migration
    }

    // --- Initialize services ---
    let state = file_hub::build_state(&cfg).await?;

    // --- Build router ---
    let app = file_hub::app(state, cfg.upload_limit);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
