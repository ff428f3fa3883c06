//! Face Gallery Matcher: known identities versus faces in a live frame.

use crate::extractor::{EmbeddingExtractor, ExtractError};
use crate::imaging::{self, Frame, ImagingError};
use crate::profile::{ProfileStore, StoreFailure};
use crate::types::{Embedding, FaceMatch};
use thiserror::Error;

/// Linear factor applied to frames before detection.
pub const DEFAULT_FRAME_SCALE: f32 = 0.25;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("profile store error: {0}")]
    Store(StoreFailure),
    #[error("extractor error: {0}")]
    Extract(#[from] ExtractError),
    #[error("frame error: {0}")]
    Imaging(#[from] ImagingError),
}

/// In-memory ordered list of (name, embedding) pairs.
#[derive(Debug, Default, Clone)]
pub struct Gallery {
    names: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Duplicate names are kept.
    pub fn insert(&mut self, name: impl Into<String>, embedding: Embedding) {
        self.names.push(name.into());
        self.embeddings.push(embedding);
    }

    /// Drop every entry with this name, returning how many were removed.
    pub fn remove_by_name(&mut self, name: &str) -> usize {
        let before = self.names.len();
        let mut i = 0;
        while i < self.names.len() {
            if self.names[i] == name {
                self.names.remove(i);
                self.embeddings.remove(i);
            } else {
                i += 1;
            }
        }
        before - self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }
}

/// Matches faces in frames against a gallery using an [`EmbeddingExtractor`].
pub struct FaceGalleryMatcher<E> {
    extractor: E,
    gallery: Gallery,
    frame_scale: f32,
}

impl<E: EmbeddingExtractor> FaceGalleryMatcher<E> {
    pub fn new(extractor: E, frame_scale: f32) -> Self {
        Self {
            extractor,
            gallery: Gallery::new(),
            frame_scale,
        }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn gallery_mut(&mut self) -> &mut Gallery {
        &mut self.gallery
    }

    pub fn extractor_mut(&mut self) -> &mut E {
        &mut self.extractor
    }

    /// Rebuild the gallery from every stored profile, in store order.
    ///
    /// Profiles whose photo cannot be decoded or holds no face are logged and
    /// skipped. A failing store aborts the load.
    pub fn load_gallery<S: ProfileStore>(&mut self, store: &S) -> Result<usize, GalleryError> {
        let profiles = store
            .list_profiles()
            .map_err(|e| GalleryError::Store(e.into()))?;
        let mut gallery = Gallery::new();

        for profile in profiles {
            let bytes = store
                .fetch_photo(&profile.photo_id)
                .map_err(|e| GalleryError::Store(e.into()))?;

            let image = match imaging::decode_photo(&bytes) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(name = %profile.name(), photo = %profile.photo_id, error = %e, "skipping profile: photo decode failed");
                    continue;
                }
            };

            match self.extractor.embed_first(&image) {
                Ok(Some(embedding)) => gallery.insert(profile.fields.name, embedding),
                Ok(None) => {
                    tracing::warn!(name = %profile.name(), photo = %profile.photo_id, "skipping profile: no face found in photo");
                }
                Err(e) => {
                    tracing::warn!(name = %profile.name(), error = %e, "skipping profile: embedding extraction failed");
                }
            }
        }

        tracing::info!(entries = gallery.len(), names = ?gallery.names(), "gallery loaded");
        self.gallery = gallery;
        Ok(self.gallery.len())
    }

    /// Identify every face in `frame`.
    ///
    /// Results follow detection order; boxes are in original-frame pixels.
    pub fn match_frame(&mut self, frame: &Frame) -> Result<Vec<FaceMatch>, GalleryError> {
        let rgb = frame.to_rgb_image()?;
        let small = imaging::downscale(&rgb, self.frame_scale);
        // Scaled sides are rounded, so the real ratio differs from frame_scale.
        let scale_x = small.width() as f32 / rgb.width() as f32;
        let scale_y = small.height() as f32 / rgb.height() as f32;

        let faces = self.extractor.detect(&small)?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.extractor.embed(&small, &faces)?;

        let results = faces
            .iter()
            .zip(&embeddings)
            .map(|(face, embedding)| {
                let (identity, distance) = match self.best_candidate(embedding) {
                    Some((idx, distance, true)) => (Some(self.gallery.names[idx].clone()), Some(distance)),
                    Some((_, distance, false)) => (None, Some(distance)),
                    None => (None, None),
                };
                FaceMatch {
                    rect: face.rescale(scale_x, scale_y),
                    identity,
                    distance,
                }
            })
            .collect();

        Ok(results)
    }

    /// Argmin over gallery distances and whether that entry passes the
    /// extractor's match test. `None` for an empty gallery.
    fn best_candidate(&self, probe: &Embedding) -> Option<(usize, f32, bool)> {
        let known = self.gallery.embeddings();
        let distances = self.extractor.distance(known, probe);
        let (idx, &distance) = distances
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        let accepted = self
            .extractor
            .is_match(known, probe)
            .get(idx)
            .copied()
            .unwrap_or(false);
        Some((idx, distance, accepted))
    }
}
