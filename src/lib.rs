//! File hub: grouped file uploads over an S3-style object store, with
//! per-file and per-group progress, zip archives and pre-signed sharing.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use anyhow::{Context, Result};
use axum::Router;
use config::{AppConfig, StoreBackend};
use services::{FileHub, HubSettings};
use state::AppState;
use std::sync::Arc;
use store::{
    ObjectStore,
    local::{LocalStore, UrlSigner},
    memory::MemoryStore,
    s3::{S3Settings, S3Store},
};
use url::Url;
use uuid::Uuid;

/// Open the local backend described by `cfg`.
pub async fn open_local_store(cfg: &AppConfig) -> Result<LocalStore> {
    let secret = match &cfg.signing_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!("no signing secret configured; local links die with this process");
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
        }
    };
    let public_url = Url::parse(&cfg.public_url)
        .with_context(|| format!("parsing public url `{}`", cfg.public_url))?;

    let store = LocalStore::open(
        &cfg.database_url,
        &cfg.storage_dir,
        UrlSigner::new(secret, public_url),
    )
    .await
    .context("opening local object store")?;
    Ok(store)
}

/// Connect the configured backend and start the services.
pub async fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let (store, local): (Arc<dyn ObjectStore>, Option<LocalStore>) = match cfg.backend {
        StoreBackend::Local => {
            let local = open_local_store(cfg).await?;
            local.migrate().await.context("applying schema")?;
            (Arc::new(local.clone()), Some(local))
        }
        StoreBackend::S3 => {
            let settings = S3Settings {
                endpoint: cfg.s3_endpoint.clone(),
                region: cfg.s3_region.clone(),
                access_key: cfg.s3_access_key.clone(),
                secret_key: cfg.s3_secret_key.clone(),
                force_path_style: cfg.s3_endpoint.is_some(),
            };
            (Arc::new(S3Store::connect(&settings).await), None)
        }
        StoreBackend::Memory => (Arc::new(MemoryStore::new()), None),
    };

    let hub = FileHub::new(
        store,
        HubSettings {
            bucket: cfg.bucket.clone(),
            share_expiry: cfg.share_expiry,
        },
    );
    Ok(AppState::new(hub, local))
}

/// The complete HTTP application.
pub fn app(state: AppState, upload_limit: usize) -> Router {
    routes::routes::routes(upload_limit).with_state(state)
}
