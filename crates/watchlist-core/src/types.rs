use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map this box back to a frame that was scaled by `scale_x` and
    /// `scale_y` before detection.
    ///
    /// Every edge is divided by its axis factor and rounded to the nearest pixel.
    pub fn rescale(&self, scale_x: f32, scale_y: f32) -> FaceRect {
        let undo = |v: f32, scale: f32| (v / scale).round() as i32;
        FaceRect {
            left: undo(self.x, scale_x),
            top: undo(self.y, scale_y),
            right: undo(self.x + self.width, scale_x),
            bottom: undo(self.y + self.height, scale_y),
        }
    }
}

/// Integer pixel rectangle in original-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceRect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A detected face in a frame and who it was matched to, if anyone.
#[derive(Debug, Clone, Serialize)]
pub struct FaceMatch {
    pub rect: FaceRect,
    /// `None` when no gallery entry passed the tolerance test.
    pub identity: Option<String>,
    /// Distance to the closest gallery entry (absent for an empty gallery).
    pub distance: Option<f32>,
}

impl FaceMatch {
    /// Display label: the matched name, or "Unknown".
    pub fn label(&self) -> &str {
        self.identity.as_deref().unwrap_or("Unknown")
    }
}
