//! Remote copy of model artifacts over HTTP.

use crate::domain::ports::ArtifactUploader;
use crate::infrastructure::core::HttpClientFactory;
use crate::infrastructure::persistence::sha256_hex;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use std::time::Duration;
use tracing::info;

/// PUTs each bundle to `<base_url>/<version>` with its checksum in a header.
pub struct HttpArtifactUploader {
    client: ClientWithMiddleware,
    base_url: String,
    token: Option<String>,
}

impl HttpArtifactUploader {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client_with_timeout(Duration::from_secs(120)),
            base_url: base_url.into(),
            token,
        }
    }

    pub fn artifact_url(&self, version: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), version)
    }
}

#[async_trait]
impl ArtifactUploader for HttpArtifactUploader {
    async fn upload(&self, version: &str, bundle: &[u8]) -> Result<()> {
        let url = self.artifact_url(version);
        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .header("X-Checksum-Sha256", sha256_hex(bundle))
            .body(bundle.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to upload {} to {}", version, url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upload of {} rejected ({}): {}", version, status, body);
        }
        info!("HttpArtifactUploader: uploaded {} ({} bytes)", version, bundle.len());
        Ok(())
    }
}
