use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Twilio account used for SMS alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

/// Optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub camera_device: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub frame_scale: Option<f32>,
    pub match_tolerance: Option<f32>,
    pub cooldown_secs: Option<u64>,
    pub alert_queue: Option<usize>,
    pub geo_endpoint: Option<String>,
    pub twilio_sid: Option<String>,
    pub twilio_token: Option<String>,
    pub twilio_from: Option<String>,
    pub system_bus: Option<bool>,
}

impl FileConfig {
    /// Read `path`. A missing file yields the empty config.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Daemon configuration: config file values overridden by `WATCHLIST_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Downscale factor applied to frames before detection.
    pub frame_scale: f32,
    /// Euclidean embedding distance at or below which faces match.
    pub match_tolerance: f32,
    /// Seconds between resets of the sighting set.
    pub cooldown_secs: u64,
    /// Capacity of the alert queue between engine and dispatcher.
    pub alert_queue: usize,
    /// Geolocation endpoint (ip-api.com JSON format).
    pub geo_endpoint: String,
    /// SMS credentials; `None` disables sending.
    pub twilio: Option<TwilioConfig>,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load the config file named by `WATCHLIST_CONFIG` (or the XDG default),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("WATCHLIST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        let file = FileConfig::read(&path)?;
        Self::with_file(file)
    }

    pub fn with_file(file: FileConfig) -> Result<Self, ConfigError> {
        let model_dir = env_string("WATCHLIST_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or_else(watchlist_core::default_model_dir);

        let db_path = env_string("WATCHLIST_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(watchlist_store::default_db_path);

        let sid = env_string("WATCHLIST_TWILIO_SID").or(file.twilio_sid);
        let token = env_string("WATCHLIST_TWILIO_TOKEN").or(file.twilio_token);
        let from = env_string("WATCHLIST_TWILIO_FROM").or(file.twilio_from);
        let twilio = match (sid, token, from) {
            (Some(account_sid), Some(auth_token), Some(from)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from,
            }),
            _ => None,
        };

        let config = Self {
            camera_device: env_string("WATCHLIST_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir,
            db_path,
            frame_scale: env_f32(
                "WATCHLIST_FRAME_SCALE",
                file.frame_scale
                    .unwrap_or(watchlist_core::gallery::DEFAULT_FRAME_SCALE),
            ),
            match_tolerance: env_f32(
                "WATCHLIST_MATCH_TOLERANCE",
                file.match_tolerance
                    .unwrap_or(watchlist_core::extractor::DEFAULT_TOLERANCE),
            ),
            cooldown_secs: env_u64(
                "WATCHLIST_COOLDOWN_SECS",
                file.cooldown_secs
                    .unwrap_or(watchlist_core::dedup::DEFAULT_COOLDOWN.as_secs()),
            ),
            alert_queue: env_usize("WATCHLIST_ALERT_QUEUE", file.alert_queue.unwrap_or(16)),
            geo_endpoint: env_string("WATCHLIST_GEO_ENDPOINT")
                .or(file.geo_endpoint)
                .unwrap_or_else(|| watchlist_alert::geo::DEFAULT_ENDPOINT.to_string()),
            twilio,
            system_bus: env_string("WATCHLIST_SYSTEM_BUS")
                .map(|v| v != "0")
                .or(file.system_bus)
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the matcher and cooldown timer cannot work with.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_scale.is_finite() && self.frame_scale > 0.0 && self.frame_scale <= 1.0) {
            return Err(invalid("frame_scale", self.frame_scale));
        }
        if !(self.match_tolerance.is_finite() && self.match_tolerance >= 0.0) {
            return Err(invalid("match_tolerance", self.match_tolerance));
        }
        if self.cooldown_secs == 0 {
            return Err(invalid("cooldown_secs", self.cooldown_secs));
        }
        if self.alert_queue == 0 {
            return Err(invalid("alert_queue", self.alert_queue));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(watchlist_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(watchlist_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("watchlist")
        .join("watchlistd.toml")
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
