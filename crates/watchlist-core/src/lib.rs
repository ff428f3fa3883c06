//! watchlist-core: Face gallery matching and sighting de-duplication.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on the CPU, to match faces in live frames
//! against a gallery of registered profiles.

pub mod alert;
pub mod alignment;
pub mod dedup;
pub mod detector;
pub mod extractor;
pub mod gallery;
pub mod imaging;
pub mod profile;
pub mod recognizer;
pub mod session;
pub mod types;

pub use alert::{AlertSink, Contact, Location, Sighting};
pub use dedup::{ResetTimer, SightingDeduplicator};
pub use extractor::{EmbeddingExtractor, ExtractError, OnnxExtractor};
pub use gallery::{FaceGalleryMatcher, Gallery, GalleryError};
pub use imaging::{ChannelOrder, Frame};
pub use profile::{enroll_profile, EnrollError, Enrolled, Profile, ProfileFields, ProfileStore};
pub use session::{DetectionSession, FrameSource, SessionError, SessionStats};
pub use types::{BoundingBox, Embedding, FaceMatch, FaceRect};

/// SCRFD detection model file name.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default directory for model files: `$XDG_DATA_HOME/watchlist/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    data_dir().join("models")
}

/// Per-user data directory: `$XDG_DATA_HOME/watchlist`, falling back to
/// `~/.local/share/watchlist`.
pub fn data_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("watchlist")
}
