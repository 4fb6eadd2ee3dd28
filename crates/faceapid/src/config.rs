use faceapi_core::ModelPaths;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
///
/// Read from the TOML file named by `FACEAPI_CONFIG` when set, then
/// overridden field by field from `FACEAPI_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where uploads are staged while a request is processed.
    pub upload_dir: PathBuf,
    /// Request body cap; larger uploads get 413.
    pub max_upload_bytes: usize,
    /// JSON array of metadata records.
    pub metadata_path: PathBuf,
    /// SQLite database holding the users table.
    pub db_path: PathBuf,
    /// HS256 signing secret. A random one is generated when unset, which
    /// invalidates all tokens on restart.
    pub jwt_secret: Option<String>,
    /// Lifetime of issued access tokens.
    pub token_ttl_secs: u64,
    /// Require a bearer token on face and metadata endpoints.
    pub require_auth: bool,
    /// Append a metadata record after each successful detect/compare.
    pub record_metadata: bool,
    /// Timeout for fetching `url` inputs.
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            model_dir: faceapi_core::default_model_dir(),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            metadata_path: PathBuf::from("face_metadata.json"),
            db_path: PathBuf::from("users.db"),
            jwt_secret: None,
            token_ttl_secs: 3600,
            require_auth: true,
            record_metadata: true,
            fetch_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("FACEAPI_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACEAPI_*` variables returned by `lookup`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEAPI_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("FACEAPI_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEAPI_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEAPI_METADATA_PATH") {
            self.metadata_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEAPI_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEAPI_JWT_SECRET") {
            self.jwt_secret = Some(v).filter(|s| !s.is_empty());
        }
        env_parse(&lookup, "FACEAPI_MAX_UPLOAD_BYTES", &mut self.max_upload_bytes);
        env_parse(&lookup, "FACEAPI_TOKEN_TTL_SECS", &mut self.token_ttl_secs);
        env_parse(&lookup, "FACEAPI_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs);
        env_bool(&lookup, "FACEAPI_REQUIRE_AUTH", &mut self.require_auth);
        env_bool(&lookup, "FACEAPI_RECORD_METADATA", &mut self.record_metadata);
    }

    /// Model file locations inside `model_dir`.
    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(&self.model_dir)
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *field = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable value"),
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut bool) {
    if let Some(raw) = lookup(key) {
        *field = !matches!(raw.trim(), "0" | "false" | "no" | "off");
    }
}
