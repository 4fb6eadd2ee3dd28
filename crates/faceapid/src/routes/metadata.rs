use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use faceapi_core::FaceEdges;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::metadata::{MetadataRecord, UserRef};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    user_id: Option<UserRef>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    bbox: Option<FaceEdges>,
    #[serde(default)]
    similarity_score: Option<f32>,
}

#[derive(Serialize)]
pub struct Saved {
    success: bool,
    message: &'static str,
    metadata: MetadataRecord,
}

#[derive(Serialize)]
pub struct Listing {
    success: bool,
    metadata: Vec<Value>,
}

pub async fn save(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewRecord>, JsonRejection>,
) -> Result<Json<Saved>> {
    let Json(body) = body?;
    let image_path = body.image_path.filter(|p| !p.is_empty());
    let (Some(user_id), Some(image_path)) = (body.user_id, image_path) else {
        return Err(ApiError::BadRequest(
            "Missing user_id or image_path in JSON".to_string(),
        ));
    };

    let record = MetadataRecord::new(user_id, image_path)
        .with_bbox(body.bbox)
        .with_similarity_score(body.similarity_score);
    state
        .metadata
        .append(&record)
        .await
        .map_err(|e| ApiError::failed("Metadata", e))?;

    Ok(Json(Saved {
        success: true,
        message: "Metadata saved",
        metadata: record,
    }))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Listing>> {
    let metadata = state
        .metadata
        .list()
        .await
        .map_err(|e| ApiError::failed("Retrieval", e))?;
    Ok(Json(Listing {
        success: true,
        metadata,
    }))
}
