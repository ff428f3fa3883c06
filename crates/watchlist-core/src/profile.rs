//! Registered profiles and the store seam they live behind.

use crate::extractor::{EmbeddingExtractor, ExtractError};
use crate::imaging::{self, ImagingError};
use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type-erased store error, for callers generic over [`ProfileStore`].
pub type StoreFailure = Box<dyn std::error::Error + Send + Sync>;

/// Operator-supplied fields of a profile. Everything but `name` is opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileFields {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub date_of_birth: String,
    pub blood_group: String,
    pub father_name: String,
    pub mother_name: String,
    pub records: String,
}

/// A stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub fields: ProfileFields,
    /// Reference to the stored photograph.
    pub photo_id: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl Profile {
    pub fn name(&self) -> &str {
        &self.fields.name
    }
}

/// Persistence for profiles and their photographs.
///
/// Profiles are listed in insertion order. Names are not unique; deletion
/// removes the oldest profile carrying the name.
pub trait ProfileStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn list_profiles(&self) -> Result<Vec<Profile>, Self::Error>;

    fn fetch_photo(&self, photo_id: &str) -> Result<Vec<u8>, Self::Error>;

    /// Store the photo and the profile referencing it as one unit.
    fn insert_profile(&mut self, fields: &ProfileFields, photo: &[u8], filename: &str) -> Result<Profile, Self::Error>;

    /// Returns whether a profile was removed.
    fn delete_profile(&mut self, name: &str) -> Result<bool, Self::Error>;
}

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("profile name is required")]
    MissingName,
    #[error("photo could not be read: {0}")]
    Photo(#[from] ImagingError),
    #[error("no face detected in photo")]
    NoFaceDetected,
    #[error("embedding extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("profile store error: {0}")]
    Store(StoreFailure),
}

/// A freshly stored profile and the embedding derived from its photo.
#[derive(Debug, Clone)]
pub struct Enrolled {
    pub profile: Profile,
    pub embedding: Embedding,
}

/// Register a profile, but only if its photo yields a face embedding.
///
/// Extraction happens before anything is written, so a rejected photo
/// leaves the store untouched. Only the first detected face is used.
pub fn enroll_profile<S, E>(
    store: &mut S,
    extractor: &mut E,
    fields: &ProfileFields,
    photo: &[u8],
    filename: &str,
) -> Result<Enrolled, EnrollError>
where
    S: ProfileStore,
    E: EmbeddingExtractor,
{
    if fields.name.trim().is_empty() {
        return Err(EnrollError::MissingName);
    }

    let image = imaging::decode_photo(photo)?;
    let embedding = extractor.embed_first(&image)?.ok_or(EnrollError::NoFaceDetected)?;

    let profile = store
        .insert_profile(fields, photo, filename)
        .map_err(|e| EnrollError::Store(e.into()))?;

    tracing::info!(name = %profile.name(), photo = %profile.photo_id, "profile enrolled");

    Ok(Enrolled { profile, embedding })
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    #[derive(Debug, Error)]
    pub enum MemoryError {
        #[error("store offline")]
        Offline,
        #[error("photo not found: {0}")]
        PhotoNotFound(String),
    }

    /// Vec-backed store for tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub profiles: Vec<Profile>,
        pub photos: Vec<(String, Vec<u8>)>,
        pub fail: bool,
    }

    impl MemoryStore {
        /// Add a profile without any checks, e.g. with a corrupt photo.
        pub fn insert_raw_profile(&mut self, name: &str, photo: Vec<u8>) {
            let photo_id = format!("photo-{}", self.photos.len());
            self.photos.push((photo_id.clone(), photo));
            self.profiles.push(Profile {
                fields: ProfileFields { name: name.into(), ..Default::default() },
                photo_id,
                created_at: String::new(),
            });
        }
    }

    impl ProfileStore for MemoryStore {
        type Error = MemoryError;

        fn list_profiles(&self) -> Result<Vec<Profile>, MemoryError> {
            if self.fail {
                return Err(MemoryError::Offline);
            }
            Ok(self.profiles.clone())
        }

        fn fetch_photo(&self, photo_id: &str) -> Result<Vec<u8>, MemoryError> {
            self.photos
                .iter()
                .find(|(id, _)| id == photo_id)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| MemoryError::PhotoNotFound(photo_id.to_string()))
        }

        fn insert_profile(&mut self, fields: &ProfileFields, photo: &[u8], _filename: &str) -> Result<Profile, MemoryError> {
            if self.fail {
                return Err(MemoryError::Offline);
            }
            let photo_id = format!("photo-{}", self.photos.len());
            self.photos.push((photo_id.clone(), photo.to_vec()));
            let profile = Profile {
                fields: fields.clone(),
                photo_id,
                created_at: chrono::Utc::now().to_rfc3339(),
            };
            self.profiles.push(profile.clone());
            Ok(profile)
        }

        fn delete_profile(&mut self, name: &str) -> Result<bool, MemoryError> {
            match self.profiles.iter().position(|p| p.name() == name) {
                Some(idx) => {
                    self.profiles.remove(idx);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}
