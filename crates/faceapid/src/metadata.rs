//! Processing records persisted as one JSON array on disk.
//!
//! Entries are not schema-checked on read: the file may hold records written
//! by older versions or by hand, and listing returns them as found.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use faceapi_core::FaceEdges;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

pub const STATUS_PROCESSED: &str = "processed";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("metadata file is not a JSON array: {0}")]
    Json(#[from] serde_json::Error),
}

/// User reference as sent by clients: numeric ID or free-form name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(i64),
    Name(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "{id}"),
            UserRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub user_id: UserRef,
    pub image_path: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<FaceEdges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    pub status: String,
}

impl MetadataRecord {
    /// A processed record stamped with the current time.
    pub fn new(user_id: UserRef, image_path: impl Into<String>) -> Self {
        Self {
            user_id,
            image_path: image_path.into(),
            timestamp: Utc::now().to_rfc3339(),
            bbox: None,
            similarity_score: None,
            status: STATUS_PROCESSED.to_string(),
        }
    }

    pub fn with_bbox(mut self, bbox: Option<FaceEdges>) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn with_similarity_score(mut self, score: Option<f32>) -> Self {
        self.similarity_score = score;
        self
    }
}

/// Append-only store over a JSON array file.
///
/// Appends are serialized so concurrent requests cannot lose each other's
/// records. The file is replaced atomically on every write.
pub struct MetadataStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record; returns the number of records now stored.
    pub async fn append(&self, record: &MetadataRecord) -> Result<usize, MetadataError> {
        let _guard = self.lock.lock().await;

        let mut records = self.read_all().await?;
        records.push(serde_json::to_value(record)?);
        let body = serde_json::to_vec_pretty(&records)?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io(e))?;
        }
        tokio::fs::write(&tmp, body).await.map_err(|e| self.io(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io(e))?;

        tracing::debug!(
            path = %self.path.display(),
            count = records.len(),
            "metadata record appended"
        );
        Ok(records.len())
    }

    /// Every stored record in insertion order; empty when the file does not exist.
    pub async fn list(&self) -> Result<Vec<Value>, MetadataError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn read_all(&self) -> Result<Vec<Value>, MetadataError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn io(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
