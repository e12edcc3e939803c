use anyhow::{Context, Result};
use facegate_core::GalleryStore;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod dbus_interface;
mod engine;
mod http_provider;
mod service;

use config::{BusKind, Config};
use dbus_interface::{FacegateService, BUS_NAME, OBJECT_PATH};
use service::{RecognizerService, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facegated starting");

    let config = Config::from_env();
    tracing::info!(
        known_faces_dir = %config.known_faces_dir.display(),
        cache = %config.cache_path.display(),
        tolerance = config.tolerance,
        provider = %config.provider_url,
        "configuration loaded"
    );

    let provider = http_provider::HttpProvider::new(&config.provider_url, config.provider_timeout());
    let store = GalleryStore::new(config.store_config());
    let engine = engine::spawn_engine(provider, store).context("failed to start engine")?;

    let attendance = attendance::AttendanceLog::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;

    let service = RecognizerService::new(
        engine,
        attendance,
        ServiceConfig {
            tolerance: config.tolerance,
            request_timeout: config.request_timeout(),
            max_upload_bytes: config.max_upload_bytes,
        },
    );

    // Non-fatal; the engine retries the load on first use.
    match service.load(false).await {
        Ok(0) => tracing::warn!("gallery is empty; enroll someone before recognizing"),
        Ok(count) => tracing::info!(encodings = count, "gallery loaded"),
        Err(e) => tracing::warn!(error = %e, "initial gallery load failed"),
    }

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, FacegateService::new(service))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
