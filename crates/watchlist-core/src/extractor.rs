//! Face detection plus embedding extraction behind one seam.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

/// Euclidean tolerance on L2-normalised ArcFace embeddings (≈ cosine 0.395).
pub const DEFAULT_TOLERANCE: f32 = 1.10;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detects faces and turns them into comparable embeddings.
///
/// `distance` and `is_match` use the same metric; `is_match` applies the
/// extractor's own tolerance.
pub trait EmbeddingExtractor {
    /// Face boxes in `image`, highest confidence first.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError>;

    /// One embedding per box, in the same order.
    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractError>;

    /// Match threshold used by [`is_match`](Self::is_match).
    fn tolerance(&self) -> f32 {
        DEFAULT_TOLERANCE
    }

    fn distance(&self, gallery: &[Embedding], probe: &Embedding) -> Vec<f32> {
        gallery.iter().map(|known| known.euclidean_distance(probe)).collect()
    }

    fn is_match(&self, gallery: &[Embedding], probe: &Embedding) -> Vec<bool> {
        let tolerance = self.tolerance();
        self.distance(gallery, probe)
            .into_iter()
            .map(|d| d <= tolerance)
            .collect()
    }

    /// Embedding of the first (most confident) face, if any.
    fn embed_first(&mut self, image: &RgbImage) -> Result<Option<Embedding>, ExtractError> {
        let faces = self.detect(image)?;
        let Some(first) = faces.into_iter().next() else {
            return Ok(None);
        };
        Ok(self.embed(image, std::slice::from_ref(&first))?.into_iter().next())
    }
}

/// SCRFD detection + ArcFace recognition.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    tolerance: f32,
}

impl OnnxExtractor {
    pub fn load(scrfd_path: &str, arcface_path: &str, tolerance: f32) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
            tolerance,
        })
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractError> {
        faces
            .iter()
            .map(|face| self.recognizer.extract(image, face).map_err(ExtractError::from))
            .collect()
    }

    fn tolerance(&self) -> f32 {
        self.tolerance
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{face_at, ScriptedExtractor};
    use super::*;

    #[test]
    fn test_default_distance_is_euclidean() {
        let ex = ScriptedExtractor::default();
        let gallery = vec![Embedding::new(vec![0.0, 0.0]), Embedding::new(vec![3.0, 4.0])];
        let d = ex.distance(&gallery, &Embedding::new(vec![0.0, 0.0]));
        assert_eq!(d, vec![0.0, 5.0]);
    }

    #[test]
    fn test_is_match_applies_tolerance() {
        let ex = ScriptedExtractor::default();
        let gallery = vec![
            Embedding::new(vec![0.5, 0.0]),
            Embedding::new(vec![0.7, 0.0]),
        ];
        let m = ex.is_match(&gallery, &Embedding::new(vec![0.0, 0.0]));
        assert_eq!(m, vec![true, false]);
    }

    #[test]
    fn test_embed_first_takes_first_face() {
        let mut ex = ScriptedExtractor::default();
        ex.push_frame(vec![
            face_at(0.0, 0.0, 10.0, vec![1.0, 0.0]),
            face_at(50.0, 0.0, 10.0, vec![0.0, 1.0]),
        ]);
        let image = RgbImage::new(4, 4);
        let emb = ex.embed_first(&image).unwrap().unwrap();
        assert_eq!(emb.values, vec![1.0, 0.0]);
    }

    #[test]
    fn test_embed_first_without_faces() {
        let mut ex = ScriptedExtractor::default();
        let image = RgbImage::new(4, 4);
        assert!(ex.embed_first(&image).unwrap().is_none());
    }
}
