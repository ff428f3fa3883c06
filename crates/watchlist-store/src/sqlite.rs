//! SQLite implementation of [`ProfileStore`], plus the contacts table.

use crate::schema::SCHEMA;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;
use watchlist_core::{Contact, Profile, ProfileFields, ProfileStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("photo not found: {0}")]
    PhotoNotFound(String),
}

const PROFILE_COLUMNS: &str = "name, age, gender, date_of_birth, blood_group, \
                               father_name, mother_name, records, photo_id, created_at";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened profile database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn add_contact(&self, phone: &str, lat: f64, lon: f64) -> Result<Contact, StoreError> {
        self.conn.execute(
            "INSERT INTO contacts (phone, lat, lon) VALUES (?1, ?2, ?3)",
            params![phone, lat, lon],
        )?;
        tracing::info!(phone, lat, lon, "contact added");
        Ok(Contact {
            phone: phone.to_string(),
            lat,
            lon,
        })
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT phone, lat, lon FROM contacts ORDER BY id")?;
        let contacts = stmt
            .query_map([], |row| {
                Ok(Contact {
                    phone: row.get(0)?,
                    lat: row.get(1)?,
                    lon: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(contacts)
    }
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let text = |i: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(i)?.unwrap_or_default())
    };
    Ok(Profile {
        fields: ProfileFields {
            name: row.get(0)?,
            age: text(1)?,
            gender: text(2)?,
            date_of_birth: text(3)?,
            blood_group: text(4)?,
            father_name: text(5)?,
            mother_name: text(6)?,
            records: text(7)?,
        },
        photo_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl ProfileStore for SqliteStore {
    type Error = StoreError;

    fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY seq"))?;
        let profiles = stmt
            .query_map([], profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    fn fetch_photo(&self, photo_id: &str) -> Result<Vec<u8>, StoreError> {
        self.conn
            .query_row("SELECT data FROM photos WHERE id = ?1", [photo_id], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?
            .ok_or_else(|| StoreError::PhotoNotFound(photo_id.to_string()))
    }

    fn insert_profile(
        &mut self,
        fields: &ProfileFields,
        photo: &[u8],
        filename: &str,
    ) -> Result<Profile, StoreError> {
        let photo_id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO photos (id, filename, data) VALUES (?1, ?2, ?3)",
            params![photo_id, filename, photo],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO profiles ({PROFILE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                fields.name,
                fields.age,
                fields.gender,
                fields.date_of_birth,
                fields.blood_group,
                fields.father_name,
                fields.mother_name,
                fields.records,
                photo_id,
                created_at,
            ],
        )?;
        tx.commit()?;

        tracing::debug!(name = %fields.name, photo_id, bytes = photo.len(), "profile stored");

        Ok(Profile {
            fields: fields.clone(),
            photo_id,
            created_at,
        })
    }

    fn delete_profile(&mut self, name: &str) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let oldest: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, photo_id FROM profiles WHERE name = ?1 ORDER BY seq LIMIT 1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((seq, photo_id)) = oldest else {
            return Ok(false);
        };

        tx.execute("DELETE FROM profiles WHERE seq = ?1", [seq])?;
        tx.execute("DELETE FROM photos WHERE id = ?1", [&photo_id])?;
        tx.commit()?;

        tracing::info!(name, photo_id, "profile deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(name: &str) -> ProfileFields {
        ProfileFields {
            name: name.into(),
            age: "41".into(),
            blood_group: "O+".into(),
            records: "burglary (2019)".into(),
            ..Default::default()
        }
    }

    fn photo_count(store: &SqliteStore) -> i64 {
        store
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_and_list_round_trip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let stored = store.insert_profile(&fields("Mallory"), b"jpegbytes", "m.jpg").unwrap();

        assert_eq!(stored.name(), "Mallory");
        assert!(uuid::Uuid::parse_str(&stored.photo_id).is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.created_at).is_ok());

        let listed = store.list_profiles().unwrap();
        assert_eq!(listed, vec![stored.clone()]);
        assert_eq!(store.fetch_photo(&stored.photo_id).unwrap(), b"jpegbytes");
    }

    #[test]
    fn test_list_in_insertion_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        for name in ["Carol", "Alice", "Bob"] {
            store.insert_profile(&fields(name), b"x", "p.jpg").unwrap();
        }
        let names: Vec<String> = store
            .list_profiles()
            .unwrap()
            .into_iter()
            .map(|p| p.fields.name)
            .collect();
        assert_eq!(names, vec!["Carol", "Alice", "Bob"]);
    }

    #[test]
    fn test_null_columns_read_as_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .execute("INSERT INTO photos (id, data) VALUES ('p1', x'00')", [])
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO profiles (name, photo_id, created_at) VALUES ('Eve', 'p1', 'now')",
                [],
            )
            .unwrap();
        let profiles = store.list_profiles().unwrap();
        assert_eq!(profiles[0].fields.gender, "");
        assert_eq!(profiles[0].fields.records, "");
    }

    #[test]
    fn test_fetch_missing_photo() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.fetch_photo("nope").unwrap_err();
        assert!(matches!(err, StoreError::PhotoNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_delete_removes_oldest_duplicate_and_its_photo() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let first = store.insert_profile(&fields("Mallory"), b"one", "1.jpg").unwrap();
        let second = store.insert_profile(&fields("Mallory"), b"two", "2.jpg").unwrap();
        store.insert_profile(&fields("Trent"), b"three", "3.jpg").unwrap();

        assert!(store.delete_profile("Mallory").unwrap());

        let remaining = store.list_profiles().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].photo_id, second.photo_id);
        assert!(matches!(
            store.fetch_photo(&first.photo_id),
            Err(StoreError::PhotoNotFound(_))
        ));
        assert_eq!(photo_count(&store), 2);
    }

    #[test]
    fn test_delete_unknown_name() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_profile(&fields("Trent"), b"x", "t.jpg").unwrap();
        assert!(!store.delete_profile("Nobody").unwrap());
        assert_eq!(store.list_profiles().unwrap().len(), 1);
    }

    #[test]
    fn test_contacts_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_contact("+15550100", 40.7, -74.0).unwrap();
        store.add_contact("+445550100", 51.5, -0.1).unwrap();

        let contacts = store.list_contacts().unwrap();
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].phone, "+15550100");
        assert_eq!(contacts[1].lat, 51.5);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watchlist.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.insert_profile(&fields("Mallory"), b"jpeg", "m.jpg").unwrap();
            store.add_contact("+1", 0.0, 0.0).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_profiles().unwrap()[0].name(), "Mallory");
        assert_eq!(store.list_contacts().unwrap().len(), 1);
    }
}
