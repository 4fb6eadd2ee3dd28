//! Face attribute estimation via ONNX Runtime.
//!
//! Two optional models are supported:
//! - InsightFace `genderage` (96×96 RGB crop, outputs `[female, male, age / 100]`)
//! - FER+ emotion (64×64 grayscale crop, outputs 8 emotion logits)

use crate::alignment;
use crate::frame::Frame;
use crate::types::{BoundingBox, Emotion, FaceAttributes, GenderScores, Region};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

const GENDERAGE_INPUT_SIZE: usize = 96;
/// Crop side relative to the longer box edge.
const GENDERAGE_CROP_FACTOR: f32 = 1.5;
const GENDERAGE_AGE_SCALE: f32 = 100.0;

const EMOTION_INPUT_SIZE: usize = 64;
/// FER+ output order.
const FERPLUS_LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprise,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Contempt,
];

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

fn load_session(model_path: &str, kind: &str) -> Result<Session, AnalyzerError> {
    if !Path::new(model_path).exists() {
        return Err(AnalyzerError::ModelNotFound(model_path.to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(1)?
        .commit_from_file(model_path)?;

    tracing::info!(
        path = model_path,
        kind,
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded attribute model"
    );

    Ok(session)
}

/// Gender and age estimator.
pub struct GenderAgeModel {
    session: Session,
}

impl GenderAgeModel {
    pub fn load(model_path: &str) -> Result<Self, AnalyzerError> {
        Ok(Self {
            session: load_session(model_path, "genderage")?,
        })
    }

    /// Estimate gender probabilities and age for one face.
    pub fn estimate(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<(GenderScores, u32), AnalyzerError> {
        let crop = alignment::crop_scaled(
            &frame.data,
            frame.width,
            frame.height,
            3,
            face.center(),
            crop_scale(face, GENDERAGE_INPUT_SIZE, GENDERAGE_CROP_FACTOR),
            GENDERAGE_INPUT_SIZE,
        );
        let input = to_nchw(&crop, GENDERAGE_INPUT_SIZE, 3);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, pred) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("genderage: {e}")))?;

        decode_gender_age(pred)
    }
}

/// Emotion classifier.
pub struct EmotionModel {
    session: Session,
}

impl EmotionModel {
    pub fn load(model_path: &str) -> Result<Self, AnalyzerError> {
        Ok(Self {
            session: load_session(model_path, "emotion")?,
        })
    }

    /// Emotion probabilities in percent for one face.
    pub fn classify(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<BTreeMap<Emotion, f32>, AnalyzerError> {
        let gray = frame.to_grayscale();
        let crop = alignment::crop_scaled(
            &gray,
            frame.width,
            frame.height,
            1,
            face.center(),
            crop_scale(face, EMOTION_INPUT_SIZE, 1.0),
            EMOTION_INPUT_SIZE,
        );
        let input = to_nchw(&crop, EMOTION_INPUT_SIZE, 1);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("emotion: {e}")))?;

        decode_emotion(logits)
    }
}

/// Gender/age plus optional emotion, producing [`FaceAttributes`].
pub struct AttributeAnalyzer {
    gender_age: GenderAgeModel,
    emotion: Option<EmotionModel>,
}

impl AttributeAnalyzer {
    pub fn new(gender_age: GenderAgeModel, emotion: Option<EmotionModel>) -> Self {
        Self { gender_age, emotion }
    }

    pub fn has_emotion(&self) -> bool {
        self.emotion.is_some()
    }

    pub fn analyze(
        &mut self,
        frame: &Frame,
        face: &BoundingBox,
    ) -> Result<FaceAttributes, AnalyzerError> {
        let (gender, age) = self.gender_age.estimate(frame, face)?;

        let emotion = match self.emotion.as_mut() {
            Some(model) => Some(model.classify(frame, face)?),
            None => None,
        };
        let dominant_emotion = emotion.as_ref().and_then(dominant_emotion);

        Ok(FaceAttributes {
            region: Region::from_box(face, frame.width, frame.height),
            face_confidence: face.confidence,
            age,
            dominant_gender: gender.dominant(),
            gender,
            emotion,
            dominant_emotion,
        })
    }
}

/// Source-to-crop scale so that `factor * longer_edge` fills `out_size`.
fn crop_scale(face: &BoundingBox, out_size: usize, factor: f32) -> f32 {
    let side = face.width.max(face.height) * factor;
    if side > 0.0 { out_size as f32 / side } else { 1.0 }
}

/// Interleaved crop to a NCHW tensor of raw pixel values.
fn to_nchw(pixels: &[u8], size: usize, channels: usize) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, channels, size, size));
    for y in 0..size {
        for x in 0..size {
            for c in 0..channels {
                tensor[[0, c, y, x]] = pixels
                    .get((y * size + x) * channels + c)
                    .copied()
                    .unwrap_or(0) as f32;
            }
        }
    }
    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn decode_gender_age(pred: &[f32]) -> Result<(GenderScores, u32), AnalyzerError> {
    if pred.len() < 3 {
        return Err(AnalyzerError::InferenceFailed(format!(
            "genderage: expected 3 outputs, got {}",
            pred.len()
        )));
    }

    let probs = softmax(&pred[..2]);
    let gender = GenderScores {
        woman: probs[0] * 100.0,
        man: probs[1] * 100.0,
    };
    let age = (pred[2] * GENDERAGE_AGE_SCALE).round().max(0.0) as u32;

    Ok((gender, age))
}

fn decode_emotion(logits: &[f32]) -> Result<BTreeMap<Emotion, f32>, AnalyzerError> {
    if logits.len() != FERPLUS_LABELS.len() {
        return Err(AnalyzerError::InferenceFailed(format!(
            "emotion: expected {} logits, got {}",
            FERPLUS_LABELS.len(),
            logits.len()
        )));
    }

    Ok(FERPLUS_LABELS
        .iter()
        .copied()
        .zip(softmax(logits).into_iter().map(|p| p * 100.0))
        .collect())
}

fn dominant_emotion(scores: &BTreeMap<Emotion, f32>) -> Option<Emotion> {
    scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(emotion, _)| *emotion)
}
