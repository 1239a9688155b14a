//! Versioned on-disk artifact store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<version>/model.json     serialized bundle
//! <root>/<version>/manifest.json  ArtifactInfo with the bundle's SHA-256
//! <root>/.<version>.partial/      staging directory, renamed into place when complete
//! ```
//!
//! Only directories with a manifest are listed, so an interrupted save never
//! shows up as a version.

use crate::domain::errors::PipelineError;
use crate::domain::ports::{ArtifactInfo, ModelStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const BUNDLE_FILE: &str = "model.json";
const MANIFEST_FILE: &str = "manifest.json";

pub struct FileModelStore {
    root: PathBuf,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: &str) -> Result<PathBuf> {
        let safe = !version.is_empty()
            && !version.starts_with('.')
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(PipelineError::validation(format!("invalid version tag {:?}", version)).into());
        }
        Ok(self.root.join(version))
    }

    async fn read_manifest(&self, version: &str, dir: &Path) -> Result<ArtifactInfo> {
        let raw = fs::read(dir.join(MANIFEST_FILE)).await.map_err(|e| {
            anyhow::Error::from(PipelineError::CorruptArtifact {
                version: version.to_string(),
                reason: format!("manifest unreadable: {}", e),
            })
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            anyhow::Error::from(PipelineError::CorruptArtifact {
                version: version.to_string(),
                reason: format!("manifest invalid: {}", e),
            })
        })
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save(&self, version: &str, bundle: &[u8]) -> Result<ArtifactInfo> {
        let final_dir = self.version_dir(version)?;
        if fs::try_exists(&final_dir).await.unwrap_or(false) {
            return Err(PipelineError::validation(format!("version {} already exists", version)).into());
        }
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create model directory {:?}", self.root))?;

        let staging = self.root.join(format!(".{}.partial", version));
        if fs::try_exists(&staging).await.unwrap_or(false) {
            warn!("FileModelStore: removing stale staging dir {:?}", staging);
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging).await?;

        let info = ArtifactInfo {
            version: version.to_string(),
            size_bytes: bundle.len() as u64,
            created_at: Utc::now(),
            checksum: sha256_hex(bundle),
        };
        fs::write(staging.join(BUNDLE_FILE), bundle)
            .await
            .context("Failed to write model bundle")?;
        fs::write(
            staging.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&info).context("Failed to serialize manifest")?,
        )
        .await
        .context("Failed to write manifest")?;
        fs::rename(&staging, &final_dir)
            .await
            .with_context(|| format!("Failed to move {:?} into place", staging))?;

        info!("FileModelStore: saved {} to {:?}", version, final_dir);
        Ok(info)
    }

    async fn load(&self, version: &str) -> Result<Vec<u8>> {
        let dir = self.version_dir(version)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(PipelineError::VersionNotFound {
                version: version.to_string(),
            }
            .into());
        }
        let info = self.read_manifest(version, &dir).await?;
        let bundle = fs::read(dir.join(BUNDLE_FILE)).await.map_err(|e| {
            anyhow::Error::from(PipelineError::CorruptArtifact {
                version: version.to_string(),
                reason: format!("bundle unreadable: {}", e),
            })
        })?;
        let checksum = sha256_hex(&bundle);
        if checksum != info.checksum {
            return Err(PipelineError::CorruptArtifact {
                version: version.to_string(),
                reason: format!("checksum {} does not match manifest {}", checksum, info.checksum),
            }
            .into());
        }
        debug!("FileModelStore: loaded {} ({} bytes)", version, bundle.len());
        Ok(bundle)
    }

    async fn list(&self) -> Result<Vec<ArtifactInfo>> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read model directory {:?}", self.root))?;
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            match self.read_manifest(&name, &entry.path()).await {
                Ok(info) => versions.push(info),
                Err(e) => warn!("FileModelStore: skipping {}: {:#}", name, e),
            }
        }
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version.cmp(&a.version))
        });
        Ok(versions)
    }

    async fn delete(&self, version: &str) -> Result<()> {
        let dir = self.version_dir(version)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(PipelineError::VersionNotFound {
                version: version.to_string(),
            }
            .into());
        }
        fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to delete {:?}", dir))?;
        info!("FileModelStore: deleted {}", version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (FileModelStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("podium_store_{}_{}", tag, uuid::Uuid::new_v4()));
        (FileModelStore::new(&dir), dir)
    }

    #[tokio::test]
    async fn test_save_load_list_delete() {
        let (store, dir) = temp_store("cycle");
        let a = store.save("v1", b"first").await.unwrap();
        assert_eq!(a.size_bytes, 5);
        assert_eq!(a.checksum, sha256_hex(b"first"));
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save("v2", b"second").await.unwrap();

        assert_eq!(store.load("v1").await.unwrap(), b"first");
        let listed: Vec<String> = store.list().await.unwrap().into_iter().map(|i| i.version).collect();
        assert_eq!(listed, vec!["v2".to_string(), "v1".to_string()]);

        store.delete("v1").await.unwrap();
        let err = PipelineError::from(store.load("v1").await.unwrap_err());
        assert!(matches!(err, PipelineError::VersionNotFound { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_tampered_bundle_is_corrupt() {
        let (store, dir) = temp_store("tamper");
        store.save("v1", b"payload").await.unwrap();
        std::fs::write(dir.join("v1").join(BUNDLE_FILE), b"PAYLOAD").unwrap();

        let err = PipelineError::from(store.load("v1").await.unwrap_err());
        assert!(matches!(err, PipelineError::CorruptArtifact { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_partial_and_duplicate_saves() {
        let (store, dir) = temp_store("partial");
        std::fs::create_dir_all(dir.join(".v9.partial")).unwrap();
        std::fs::create_dir_all(dir.join("orphan")).unwrap();
        assert!(store.list().await.unwrap().is_empty());

        store.save("v1", b"x").await.unwrap();
        assert!(store.save("v1", b"y").await.is_err());
        assert!(store.save("../up", b"y").await.is_err());
        assert_eq!(store.load("v1").await.unwrap(), b"x");
        std::fs::remove_dir_all(&dir).ok();
    }
}
