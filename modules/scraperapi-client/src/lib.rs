pub mod error;
pub mod types;

use std::time::Duration;

pub use error::{Result, ScraperApiError};
pub use types::{parse_search_body, OrganicResult, SearchPage, SearchParams, RESULTS_KEY};

const DEFAULT_ENDPOINT: &str = "https://api.scraperapi.com/structured/twitter/search";

/// Conservative per-request timeout; the upstream endpoint renders pages on demand.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the error body kept in `ScraperApiError::Api`.
const MAX_ERROR_BODY: usize = 512;

pub struct ScraperApiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ScraperApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_http(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch one page of search results. Exactly one GET, no retries.
    pub async fn search_page(&self, params: &SearchParams) -> Result<SearchPage> {
        tracing::debug!(
            query = params.query(),
            page = params.page(),
            "Requesting search page"
        );

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&params.wire(&self.api_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScraperApiError::Api {
                status: status.as_u16(),
                message: error_excerpt(&body),
            });
        }

        let body = resp.text().await?;
        let page = parse_search_body(&body)?;
        if let SearchPage::Results(ref items) = page {
            tracing::debug!(page = params.page(), count = items.len(), "Search page received");
        }
        Ok(page)
    }
}

/// First `MAX_ERROR_BODY` bytes of an error body, cut on a char boundary.
fn error_excerpt(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let end = (0..=MAX_ERROR_BODY)
        .rev()
        .find(|&i| body.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}… ({} bytes)", &body[..end], body.len())
}

fn build_http(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
