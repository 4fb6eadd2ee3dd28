use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use faceapi_core::{compare_embeddings, Metric};
use serde::Serialize;

use crate::auth::Caller;
use crate::error::{ApiError, Result};
use crate::upload::{allowed_file, Form, TempUpload, UploadedFile};
use crate::AppState;

pub(crate) const NO_FACES: &str = "No faces found in one or both images";

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    success: bool,
    #[serde(rename = "match")]
    matched: bool,
    distance: f32,
    tolerance: f32,
    message: String,
}

/// The `file1`/`file2` parts of a comparison upload, validated.
pub(crate) fn upload_pair(form: &mut Form) -> Result<(UploadedFile, UploadedFile)> {
    let (Some(first), Some(second)) = (form.take_file("file1"), form.take_file("file2")) else {
        return Err(ApiError::BadRequest("Missing file1 or file2".to_string()));
    };
    if first.filename.is_empty() || second.filename.is_empty() {
        return Err(ApiError::BadRequest("No files selected".to_string()));
    }
    if !allowed_file(&first.filename) || !allowed_file(&second.filename) {
        return Err(ApiError::BadRequest("Unsupported file types".to_string()));
    }
    Ok((first, second))
}

/// Stage both uploads and embed the best face of each.
pub(crate) async fn embed_pair(
    state: &AppState,
    first: &UploadedFile,
    second: &UploadedFile,
) -> Result<(faceapi_core::Embedding, faceapi_core::Embedding)> {
    let dir = &state.config.upload_dir;
    let staged_a = TempUpload::write(dir, &first.filename, &first.bytes)
        .await
        .map_err(|e| ApiError::failed("Comparison", e))?;
    let staged_b = TempUpload::write(dir, &second.filename, &second.bytes)
        .await
        .map_err(|e| ApiError::failed("Comparison", e))?;

    let pair = state
        .engine
        .compare(staged_a.path().to_path_buf(), staged_b.path().to_path_buf())
        .await
        .map_err(|e| ApiError::from_engine("Comparison", NO_FACES, e))?;
    Ok((pair.first, pair.second))
}

pub async fn handler(
    State(state): State<AppState>,
    caller: Caller,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<CompareResponse>> {
    let multipart =
        multipart.map_err(|_| ApiError::BadRequest("Missing file1 or file2".to_string()))?;
    let mut form = Form::read(multipart).await?;
    let (first, second) = upload_pair(&mut form)?;

    let (a, b) = embed_pair(&state, &first, &second).await?;
    let comparison = compare_embeddings(&a, &b, Metric::Euclidean)
        .map_err(|e| ApiError::failed("Comparison", e))?;

    super::record(&state, &caller, first.safe_name(), |record| {
        record.with_similarity_score(Some(comparison.value))
    })
    .await;

    tracing::info!(
        distance = comparison.value,
        matched = comparison.matched,
        user = %caller.user_id(),
        "compare"
    );
    Ok(Json(CompareResponse {
        success: true,
        matched: comparison.matched,
        distance: comparison.value,
        tolerance: comparison.threshold,
        message: format!("Comparison completed. Match: {}", comparison.matched),
    }))
}
