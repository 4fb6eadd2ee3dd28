use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

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

/// Box edges in whole pixels, clamped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceEdges {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    /// A box covering a whole `width` x `height` image, with zero confidence.
    pub fn whole_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            confidence: 0.0,
            landmarks: None,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Top/right/bottom/left edges clamped to a `width` x `height` frame.
    ///
    /// `left`/`top` stay on a pixel of the frame; `right`/`bottom` are
    /// exclusive and may equal `width`/`height`.
    pub fn edges(&self, width: u32, height: u32) -> FaceEdges {
        let (w, h) = (width as f32, height as f32);
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        FaceEdges {
            top: self.y.clamp(0.0, max_y).round() as i32,
            right: (self.x + self.width).clamp(0.0, w).round() as i32,
            bottom: (self.y + self.height).clamp(0.0, h).round() as i32,
            left: self.x.clamp(0.0, max_x).round() as i32,
        }
    }

    /// `[x_min, y_min, x_max, y_max]` in whole pixels, clamped to the frame.
    pub fn corners(&self, width: u32, height: u32) -> [i32; 4] {
        let e = self.edges(width, height);
        [e.left, e.top, e.right, e.bottom]
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
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
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

/// Face region in the analysed image, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Region {
    pub fn from_box(face: &BoundingBox, width: u32, height: u32) -> Self {
        let e = face.edges(width, height);
        Self {
            x: e.left,
            y: e.top,
            w: e.right - e.left,
            h: e.bottom - e.top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Woman,
    Man,
}

/// Gender probabilities in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenderScores {
    pub woman: f32,
    pub man: f32,
}

impl GenderScores {
    pub fn dominant(&self) -> Gender {
        if self.man > self.woman { Gender::Man } else { Gender::Woman }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    Contempt,
}

/// Per-face attribute estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub region: Region,
    pub face_confidence: f32,
    pub age: u32,
    pub gender: GenderScores,
    pub dominant_gender: Gender,
    /// Emotion probabilities in percent; absent when no emotion model is loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<BTreeMap<Emotion, f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<Emotion>,
}

/// Which models a pipeline has loaded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelStatus {
    pub detector: bool,
    pub recognizer: bool,
    pub gender_age: bool,
    pub emotion: bool,
}
