//! `/api/v1/face/*`: file-or-URL inputs and compact responses.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use faceapi_core::{compare_embeddings, FaceAttributes, Metric};
use serde::Serialize;

use super::compare::{embed_pair, upload_pair};
use crate::error::{ApiError, Result};
use crate::upload::{self, allowed_file, Form, TempUpload, UploadedFile};
use crate::AppState;

const PROVIDE_INPUT: &str = "Provide file or url";

#[derive(Debug, Serialize)]
pub struct Face {
    /// `[x1, y1, x2, y2]`.
    bbox: [i32; 4],
    score: f32,
}

#[derive(Debug, Serialize)]
pub struct Faces<T> {
    faces: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct Similarity {
    score: f32,
    #[serde(rename = "match")]
    matched: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/detect", post(detect))
        .route("/compare", post(compare))
        .route("/metadata", post(metadata))
}

/// The uploaded `file`, or the image behind the `url` field.
async fn image_input(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<UploadedFile> {
    let multipart = multipart.map_err(|_| ApiError::BadRequest(PROVIDE_INPUT.to_string()))?;
    let mut form = Form::read(multipart).await?;

    if let Some(file) = form.take_file("file").filter(|f| !f.filename.is_empty()) {
        if !allowed_file(&file.filename) {
            return Err(ApiError::BadRequest("Unsupported file type".to_string()));
        }
        return Ok(file);
    }
    match form.field("url") {
        Some(url) => upload::fetch_url(&state.http, url, state.config.max_upload_bytes).await,
        None => Err(ApiError::BadRequest(PROVIDE_INPUT.to_string())),
    }
}

async fn stage(
    state: &AppState,
    file: &UploadedFile,
    operation: &'static str,
) -> Result<TempUpload> {
    TempUpload::write(&state.config.upload_dir, &file.filename, &file.bytes)
        .await
        .map_err(|e| ApiError::failed(operation, e))
}

/// Every face with its corner box; an image without faces yields an empty list.
pub async fn detect(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Faces<Face>>> {
    let file = image_input(&state, multipart).await?;
    let staged = stage(&state, &file, "Detection").await?;

    let outcome = state
        .engine
        .detect(staged.path().to_path_buf(), false)
        .await
        .map_err(|e| ApiError::from_engine("Detection", "No faces found in image", e))?;

    let faces = outcome
        .faces
        .iter()
        .map(|face| Face {
            bbox: face.corners(outcome.width, outcome.height),
            score: face.confidence,
        })
        .collect();
    Ok(Json(Faces { faces }))
}

/// Cosine similarity of the best face in each image.
pub async fn compare(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Similarity>> {
    let multipart =
        multipart.map_err(|_| ApiError::BadRequest("Missing file1 or file2".to_string()))?;
    let mut form = Form::read(multipart).await?;
    let (first, second) = upload_pair(&mut form)?;

    let (a, b) = embed_pair(&state, &first, &second).await?;
    let comparison = compare_embeddings(&a, &b, Metric::Cosine)
        .map_err(|e| ApiError::failed("Comparison", e))?;

    Ok(Json(Similarity {
        score: comparison.value,
        matched: comparison.matched,
    }))
}

/// Age, gender and emotion estimates. An image without a detected face is
/// analysed as a whole.
pub async fn metadata(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Faces<FaceAttributes>>> {
    if !state.engine.status().gender_age {
        return Err(ApiError::Unavailable("Attribute analysis models are not loaded".to_string()));
    }

    let file = image_input(&state, multipart).await?;
    let staged = stage(&state, &file, "Metadata").await?;

    let faces = state
        .engine
        .analyze(staged.path().to_path_buf(), false)
        .await
        .map_err(|e| ApiError::from_engine("Metadata", "No faces found in image", e))?;
    Ok(Json(Faces { faces }))
}
