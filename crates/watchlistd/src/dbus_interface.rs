use crate::engine::{EngineError, EngineHandle};
use std::path::Path;
use watchlist_core::ProfileFields;
use zbus::interface;

pub const BUS_NAME: &str = "org.watchlist.Daemon1";
pub const OBJECT_PATH: &str = "/org/watchlist/Daemon1";

/// D-Bus interface for the watchlist daemon.
///
/// Bus name: org.watchlist.Daemon1
/// Object path: /org/watchlist/Daemon1
pub struct WatchlistService {
    engine: EngineHandle,
}

impl WatchlistService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn failed(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.watchlist.Daemon1")]
impl WatchlistService {
    /// Register a profile from a JSON object of fields and a photo on disk.
    async fn add_profile(&self, fields_json: &str, photo_path: &str) -> zbus::fdo::Result<String> {
        let fields: ProfileFields = serde_json::from_str(fields_json)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid profile fields: {e}")))?;
        tracing::info!(name = %fields.name, photo = photo_path, "add_profile requested");

        let photo = tokio::fs::read(photo_path).await.map_err(|e| {
            zbus::fdo::Error::InvalidArgs(format!("cannot read photo {photo_path}: {e}"))
        })?;
        let filename = Path::new(photo_path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let profile = self
            .engine
            .add_profile(fields, photo, filename)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "add_profile rejected");
                failed(e)
            })?;
        to_json(&profile)
    }

    /// Delete the oldest profile with this name.
    async fn remove_profile(&self, name: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(name, "remove_profile requested");
        self.engine.remove_profile(name.to_string()).await.map_err(failed)
    }

    async fn list_profiles(&self) -> zbus::fdo::Result<String> {
        let profiles = self.engine.list_profiles().await.map_err(failed)?;
        to_json(&profiles)
    }

    async fn add_contact(&self, phone: &str, lat: f64, lon: f64) -> zbus::fdo::Result<()> {
        if phone.trim().is_empty() {
            return Err(zbus::fdo::Error::InvalidArgs("phone number is required".into()));
        }
        tracing::info!(phone, lat, lon, "add_contact requested");
        self.engine
            .add_contact(phone.to_string(), lat, lon)
            .await
            .map(|_| ())
            .map_err(failed)
    }

    async fn list_contacts(&self) -> zbus::fdo::Result<String> {
        let contacts = self.engine.list_contacts().await.map_err(failed)?;
        to_json(&contacts)
    }

    async fn start_detection(&self) -> zbus::fdo::Result<()> {
        tracing::info!("start_detection requested");
        self.engine.start_detection().await.map_err(failed)
    }

    /// Returns whether a session was running.
    async fn stop_detection(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop_detection requested");
        self.engine.stop_detection().await.map_err(failed)
    }

    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(failed)?;
        to_json(&status)
    }
}
