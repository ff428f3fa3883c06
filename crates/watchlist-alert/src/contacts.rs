//! Nearest-contact lookup against the contacts table.

use crate::dispatcher::ContactLookup;
use crate::error::AlertError;
use async_trait::async_trait;
use std::path::Path;
use watchlist_core::alert::nearest_contact;
use watchlist_core::Contact;

/// Async read-only view of the contacts table in the watchlist database.
///
/// Contacts are re-read on every lookup, so numbers added through the
/// daemon are picked up by the next alert.
pub struct ContactDirectory {
    conn: tokio_rusqlite::Connection,
}

impl ContactDirectory {
    pub async fn open(path: &Path) -> Result<Self, AlertError> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        Ok(Self { conn })
    }

    pub async fn all(&self) -> Result<Vec<Contact>, AlertError> {
        let contacts = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT phone, lat, lon FROM contacts ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Contact {
                            phone: row.get(0)?,
                            lat: row.get(1)?,
                            lon: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        Ok(contacts)
    }
}

#[async_trait]
impl ContactLookup for ContactDirectory {
    async fn nearest(&self, lat: f64, lon: f64) -> Result<Option<Contact>, AlertError> {
        let contacts = self.all().await?;
        Ok(nearest_contact(&contacts, lat, lon).cloned())
    }
}
