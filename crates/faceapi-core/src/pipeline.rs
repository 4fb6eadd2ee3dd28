//! The full detect → embed → analyze pipeline over one set of loaded models.

use crate::attributes::{AnalyzerError, AttributeAnalyzer, EmotionModel, GenderAgeModel};
use crate::detector::{DetectorError, FaceDetector};
use crate::frame::Frame;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, FaceAttributes, ModelStatus};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";
pub const GENDER_AGE_MODEL_FILE: &str = "genderage.onnx";
pub const EMOTION_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("attribute analysis model not loaded")]
    AnalyzerUnavailable,
}

/// Locations of the four model files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub gender_age: PathBuf,
    pub emotion: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
            gender_age: dir.join(GENDER_AGE_MODEL_FILE),
            emotion: dir.join(EMOTION_MODEL_FILE),
        }
    }
}

/// The operations the service needs from a set of face models.
///
/// `detect`, `embed` and `analyze_face` wrap single model calls; the provided
/// methods compose them.
pub trait FaceBackend {
    fn status(&self) -> ModelStatus;

    /// All faces, highest confidence first.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, PipelineError>;

    fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, PipelineError>;

    /// Attribute estimates for one face.
    fn analyze_face(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceAttributes, PipelineError>;

    /// Embedding of the most confident face in the frame.
    fn embed_first(&mut self, frame: &Frame) -> Result<(BoundingBox, Embedding), PipelineError> {
        let faces = self.detect(frame)?;
        let face = faces.into_iter().next().ok_or(PipelineError::NoFaceDetected)?;
        let embedding = self.embed(frame, &face)?;
        Ok((face, embedding))
    }

    /// Attribute estimates for every face in the frame.
    ///
    /// Without `enforce_detection`, a frame with no detected face is analysed
    /// as one whole-image region.
    fn analyze(
        &mut self,
        frame: &Frame,
        enforce_detection: bool,
    ) -> Result<Vec<FaceAttributes>, PipelineError> {
        if !self.status().gender_age {
            return Err(PipelineError::AnalyzerUnavailable);
        }

        let mut faces = self.detect(frame)?;
        if faces.is_empty() {
            if enforce_detection {
                return Err(PipelineError::NoFaceDetected);
            }
            faces.push(BoundingBox::whole_frame(frame.width, frame.height));
        }

        faces
            .iter()
            .map(|face| self.analyze_face(frame, face))
            .collect()
    }
}

/// ONNX-backed [`FaceBackend`].
pub struct Pipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    analyzer: Option<AttributeAnalyzer>,
}

impl Pipeline {
    /// Load all models. Detector and recognizer are required; a missing
    /// attribute model file only disables analysis.
    pub fn load(paths: &ModelPaths) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&paths.detector.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&paths.recognizer.to_string_lossy())?;

        let gender_age = optional_model(GenderAgeModel::load(&paths.gender_age.to_string_lossy()))?;
        let emotion = optional_model(EmotionModel::load(&paths.emotion.to_string_lossy()))?;

        let analyzer = gender_age.map(|ga| AttributeAnalyzer::new(ga, emotion));
        if analyzer.is_none() {
            tracing::warn!(
                path = %paths.gender_age.display(),
                "gender/age model missing; attribute analysis disabled"
            );
        }

        Ok(Self {
            detector,
            recognizer,
            analyzer,
        })
    }
}

impl FaceBackend for Pipeline {
    fn status(&self) -> ModelStatus {
        ModelStatus {
            detector: true,
            recognizer: true,
            gender_age: self.analyzer.is_some(),
            emotion: self.analyzer.as_ref().is_some_and(|a| a.has_emotion()),
        }
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, PipelineError> {
        Ok(self.detector.detect(frame)?)
    }

    fn embed(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Embedding, PipelineError> {
        Ok(self.recognizer.extract(frame, face)?)
    }

    fn analyze_face(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceAttributes, PipelineError> {
        let analyzer = self.analyzer.as_mut().ok_or(PipelineError::AnalyzerUnavailable)?;
        Ok(analyzer.analyze(frame, face)?)
    }
}

fn optional_model<T>(loaded: Result<T, AnalyzerError>) -> Result<Option<T>, AnalyzerError> {
    match loaded {
        Ok(model) => Ok(Some(model)),
        Err(AnalyzerError::ModelNotFound(path)) => {
            tracing::info!(path, "optional model not present");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
