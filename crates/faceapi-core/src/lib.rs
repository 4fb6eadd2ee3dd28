//! faceapi-core — Face detection, recognition and attribute analysis.
//!
//! Uses SCRFD for face detection, ArcFace for face embeddings and optional
//! gender/age and FER+ emotion models, all running via ONNX Runtime for CPU
//! inference.

pub mod alignment;
pub mod annotate;
pub mod attributes;
pub mod compare;
pub mod detector;
pub mod frame;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use compare::{compare_embeddings, Comparison, Metric};
pub use detector::FaceDetector;
pub use frame::{Frame, FrameError};
pub use pipeline::{FaceBackend, ModelPaths, Pipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, Embedding, Emotion, FaceAttributes, FaceEdges, Gender, ModelStatus, Region,
};

use std::path::PathBuf;

/// `$XDG_DATA_HOME/faceapi/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceapi")
        .join("models")
}
