//! Artifact storage and serving configuration.

use super::Lookup;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub model_dir: PathBuf,
    /// Remote copy target; uploads are skipped when unset.
    pub remote_url: Option<String>,
    pub remote_token: Option<String>,
    pub use_calibration: bool,
}

impl Default for ModelEnvConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("data/models"),
            remote_url: None,
            remote_token: None,
            use_calibration: true,
        }
    }
}

impl ModelEnvConfig {
    pub(super) fn from_lookup(get: &Lookup) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Self {
            model_dir: non_empty("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            remote_url: non_empty("MODEL_REMOTE_URL"),
            remote_token: non_empty("MODEL_REMOTE_TOKEN"),
            use_calibration: get("MODEL_USE_CALIBRATION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.use_calibration),
        }
    }
}
