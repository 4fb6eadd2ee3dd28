use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use faceapi_core::FaceEdges;
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::{ApiError, Result};
use crate::upload::{allowed_file, Form, TempUpload, UploadedFile};
use crate::AppState;

const NO_FACES: &str = "No faces found in image";

#[derive(Debug, Default, Deserialize)]
pub struct DetectQuery {
    /// Include a base64 PNG with each face outlined.
    #[serde(default)]
    annotate: bool,
}

#[derive(Debug, Serialize)]
pub struct DetectedFace {
    pub bbox: FaceEdges,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    success: bool,
    faces_found: usize,
    faces: Vec<DetectedFace>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotated_image_b64: Option<String>,
}

/// The `file` part of a legacy upload, validated.
pub(crate) fn single_upload(form: &mut Form) -> Result<UploadedFile> {
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    if file.filename.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if !allowed_file(&file.filename) {
        return Err(ApiError::BadRequest("Unsupported file type".to_string()));
    }
    Ok(file)
}

pub async fn handler(
    State(state): State<AppState>,
    caller: Caller,
    query: std::result::Result<Query<DetectQuery>, QueryRejection>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>> {
    let Query(query) = query?;
    let multipart =
        multipart.map_err(|_| ApiError::BadRequest("No file uploaded".to_string()))?;
    let mut form = Form::read(multipart).await?;
    let file = single_upload(&mut form)?;

    let upload = TempUpload::write(&state.config.upload_dir, &file.filename, &file.bytes)
        .await
        .map_err(|e| ApiError::failed("Detection", e))?;
    let outcome = state
        .engine
        .detect(upload.path().to_path_buf(), query.annotate)
        .await
        .map_err(|e| ApiError::from_engine("Detection", NO_FACES, e))?;

    if outcome.faces.is_empty() {
        return Err(ApiError::Unprocessable(NO_FACES.to_string()));
    }

    let faces: Vec<DetectedFace> = outcome
        .faces
        .iter()
        .map(|face| DetectedFace {
            bbox: face.edges(outcome.width, outcome.height),
            confidence: face.confidence,
        })
        .collect();

    let first_bbox = faces.first().map(|f| f.bbox);
    super::record(&state, &caller, file.safe_name(), |record| {
        record.with_bbox(first_bbox)
    })
    .await;

    tracing::info!(faces = faces.len(), user = %caller.user_id(), "detect");
    Ok(Json(DetectResponse {
        success: true,
        faces_found: faces.len(),
        message: format!("Detected {} face(s)", faces.len()),
        faces,
        annotated_image_b64: outcome.annotated,
    }))
}
