//! Image inputs: multipart uploads, remote URLs and their temporary files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use uuid::Uuid;

use crate::error::ApiError;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// Name given to URL inputs whose path has no usable file name.
const REMOTE_FILENAME: &str = "remote_image";

/// One uploaded (or fetched) file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client.
    pub filename: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Sanitized name, safe to use as a path component.
    pub fn safe_name(&self) -> String {
        secure_filename(&self.filename)
    }
}

/// A parsed multipart form.
#[derive(Debug, Default)]
pub struct Form {
    files: HashMap<String, UploadedFile>,
    fields: HashMap<String, String>,
}

impl Form {
    /// Read every part. Parts with a filename are files, others are text.
    /// Repeated names keep the first occurrence.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    form.files.entry(name).or_insert(UploadedFile { filename, bytes });
                }
                None => {
                    let text = field.text().await?;
                    form.fields.entry(name).or_insert(text);
                }
            }
        }
        Ok(form)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    /// Non-empty text field, trimmed.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Whether `filename` has one of [`ALLOWED_EXTENSIONS`] (case-insensitive).
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied name to a single safe path component.
///
/// Keeps only the final path segment, replaces whitespace with `_`, drops
/// characters outside `[A-Za-z0-9._-]` and strips leading dots and
/// underscores. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// A staged upload, removed from disk when dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Write `bytes` under `dir` with a unique prefix on `filename`.
    pub async fn write(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let name = match secure_filename(filename) {
            safe if safe.is_empty() => Uuid::new_v4().simple().to_string(),
            safe => format!("{}_{safe}", Uuid::new_v4().simple()),
        };
        let path = dir.join(name);
        let upload = Self { path };
        tokio::fs::write(&upload.path, bytes).await?;
        Ok(upload)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove upload");
            }
        }
    }
}

/// Download an image from `url`, enforcing the upload size cap.
pub async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<UploadedFile, ApiError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| ApiError::BadRequest(format!("Invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::BadRequest(
            "Invalid url: only http and https are supported".to_string(),
        ));
    }

    let fetch_failed =
        |e: reqwest::Error| ApiError::BadRequest(format!("Could not fetch image from url: {e}"));
    let mut response = client
        .get(parsed.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_failed)?;

    if response.content_length().is_some_and(|len| len > max_bytes as u64) {
        return Err(ApiError::PayloadTooLarge);
    }
    // Content-Length may be absent, so the cap is also enforced per chunk.
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_failed)? {
        if body.len() + chunk.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    let bytes = Bytes::from(body);

    let filename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or(REMOTE_FILENAME)
        .to_string();

    tracing::debug!(url = %parsed, bytes = bytes.len(), "fetched remote image");
    Ok(UploadedFile { filename, bytes })
}
