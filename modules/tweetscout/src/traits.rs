// Trait abstractions for the pipeline's external collaborators.
//
// SearchProvider: the paginated search endpoint (ScraperApiClient in production).
// FactExtractor: relevance filter and fact extraction (LlmExtractor).
// Geocoder: place name to coordinates; infallible by signature.
// ArtifactStore: upload + catalog registration of written files.
//
// The mocks in `testing` implement each of these, so the pipeline runs in
// tests with no network and no credentials.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use scraperapi_client::{ScraperApiClient, ScraperApiError, SearchPage, SearchParams};
use tweetscout_common::{ArtifactRef, ExtractedFacts, GeoPoint, SearchQuery};

use crate::error::{ExtractionError, RegistrationError};

// ---------------------------------------------------------------------------
// SearchProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// One request for the page `query` is positioned at. No retries.
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, ScraperApiError>;
}

#[async_trait]
impl SearchProvider for ScraperApiClient {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, ScraperApiError> {
        let params = SearchParams::new(
            query.query(),
            query.start_date(),
            query.end_date(),
            query.page(),
        )?;
        ScraperApiClient::search_page(self, &params).await
    }
}

// ---------------------------------------------------------------------------
// FactExtractor
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FactExtractor: Send + Sync {
    /// Whether the item is about `topic`.
    async fn is_relevant(&self, item_text: &str, topic: &str) -> Result<bool, ExtractionError>;

    /// Structured facts for a relevant item.
    async fn extract_facts(&self, item_text: &str) -> Result<ExtractedFacts, ExtractionError>;
}

// ---------------------------------------------------------------------------
// Geocoder
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Never fails: lookup errors and misses both yield `GeoPoint::Unresolved`.
    async fn resolve(&self, place: &str) -> GeoPoint;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    async fn resolve(&self, place: &str) -> GeoPoint {
        (**self).resolve(place).await
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `local_file` under the artifact's logical path and register it.
    /// The file must already be fully written.
    async fn register(
        &self,
        artifact: &ArtifactRef,
        job_id: u64,
        local_file: &Path,
    ) -> Result<(), RegistrationError>;
}

#[async_trait]
impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    async fn register(
        &self,
        artifact: &ArtifactRef,
        job_id: u64,
        local_file: &Path,
    ) -> Result<(), RegistrationError> {
        (**self).register(artifact, job_id, local_file).await
    }
}
