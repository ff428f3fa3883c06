use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;
use watchlist_alert::{AlertDispatcher, ContactDirectory, IpApiGeolocator, SmsGateway, TwilioSms};
use watchlist_store::SqliteStore;

mod config;
mod dbus_interface;
mod engine;
mod source;

/// Time allowed for queued alerts to go out after shutdown.
const ALERT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "watchlistd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        camera = %config.camera_device,
        models = %config.model_dir.display(),
        db = %config.db_path.display(),
        cooldown_secs = config.cooldown_secs,
        "configuration loaded"
    );

    let store = SqliteStore::open(&config.db_path).context("failed to open database")?;

    let geo = IpApiGeolocator::new(config.geo_endpoint.clone())?;
    let contacts = ContactDirectory::open(&config.db_path).await?;
    let sms: Option<Box<dyn SmsGateway>> = match &config.twilio {
        Some(t) => Some(Box::new(TwilioSms::new(
            t.account_sid.clone(),
            t.auth_token.clone(),
            t.from.clone(),
        )?)),
        None => None,
    };
    let (alerts, alert_task) =
        AlertDispatcher::new(Box::new(geo), Box::new(contacts), sms).spawn(config.alert_queue);

    let engine = engine::spawn_engine(&config, store, alerts).context("failed to start engine")?;

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(dbus_interface::BUS_NAME)?
        .serve_at(
            dbus_interface::OBJECT_PATH,
            dbus_interface::WatchlistService::new(engine.clone()),
        )?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        bus = dbus_interface::BUS_NAME,
        system_bus = config.system_bus,
        "watchlistd ready"
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    tracing::info!("watchlistd shutting down");

    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "engine did not shut down cleanly");
    }
    if tokio::time::timeout(ALERT_DRAIN_TIMEOUT, alert_task).await.is_err() {
        tracing::warn!("pending alerts abandoned at shutdown");
    }

    Ok(())
}
