use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, info};
use tweetscout_common::{ArtifactRef, CatalogConfig};

use crate::error::RegistrationError;
use crate::traits::ArtifactStore;

/// Uploads through an inner store, then registers the artifact with the
/// catalog service so other jobs can find it.
pub struct CatalogGateway<S> {
    inner: S,
    client: reqwest::Client,
    config: CatalogConfig,
}

impl<S: ArtifactStore> CatalogGateway<S> {
    pub fn new(inner: S, config: CatalogConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(auth_headers(config.auth_token.as_deref()))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            inner,
            client,
            config,
        }
    }

    pub fn source_data_url(&self) -> String {
        format!(
            "{}/knowledge_source/{}/source_data",
            self.config.base_url(),
            self.config.knowledge_source_id
        )
    }

    /// `GET /ping`; anything but 200 means the catalog is unavailable.
    pub async fn ping(&self) -> Result<(), RegistrationError> {
        let url = format!("{}/ping", self.config.base_url());
        let resp = self.client.get(&url).send().await?;
        if resp.status().as_u16() != 200 {
            return Err(RegistrationError::Unreachable(format!(
                "{url} answered {}",
                resp.status()
            )));
        }
        debug!(url, "Catalog reachable");
        Ok(())
    }
}

/// Request body for the source-data endpoint: a list of physical names.
pub fn registration_body(artifact: &ArtifactRef) -> serde_json::Value {
    serde_json::json!([artifact.to_string()])
}

fn auth_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = token
        .filter(|t| !t.is_empty())
        .and_then(|t| HeaderValue::from_str(&format!("Bearer {t}")).ok())
    {
        headers.insert(AUTHORIZATION, value);
    }
    headers
}

#[async_trait]
impl<S: ArtifactStore> ArtifactStore for CatalogGateway<S> {
    async fn register(
        &self,
        artifact: &ArtifactRef,
        job_id: u64,
        local_file: &Path,
    ) -> Result<(), RegistrationError> {
        self.inner.register(artifact, job_id, local_file).await?;
        self.ping().await?;

        let resp = self
            .client
            .post(self.source_data_url())
            .json(&registration_body(artifact))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(artifact = %artifact, job_id, "Artifact registered with catalog");
        Ok(())
    }
}
