//! watchlist-store: SQLite persistence for profiles, photos and contacts.

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, StoreError};

/// Default database location: `$XDG_DATA_HOME/watchlist/watchlist.db`.
pub fn default_db_path() -> std::path::PathBuf {
    watchlist_core::data_dir().join("watchlist.db")
}
