//! Pagination and fetch engine.
//!
//! `fetch_page` turns one page of the search provider into either raw items
//! or an end-of-results signal. Transient failures retry the same page with
//! bounded exponential backoff; the page is never skipped or advanced here.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use scraperapi_client::{OrganicResult, ScraperApiError, SearchPage};
use tracing::{debug, warn};
use tweetscout_common::{RawItem, SearchQuery};

use crate::cancel::CancelFlag;
use crate::error::FetchError;
use crate::job_log::JobLog;
use crate::traits::SearchProvider;

/// Outcome of fetching one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
    /// The page's items, possibly none. The caller advances to the next page.
    Items(Vec<RawItem>),
    /// The provider has nothing more for this query.
    EndOfResults,
}

/// Bounded retry for transient fetch failures.
///
/// HTTP and network failures wait `http_cooldown * 2^attempt`; decode
/// failures wait `decode_delay * 2^attempt`. Up to `jitter` of random delay
/// is added to either.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub http_cooldown: Duration,
    pub decode_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            http_cooldown: Duration::from_secs(2),
            decode_delay: Duration::from_secs(5),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            http_cooldown: Duration::ZERO,
            decode_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before retry number `attempt + 1` (`attempt` is 0-based).
    pub fn backoff(&self, error: &ScraperApiError, attempt: u32) -> Duration {
        let base = if error.is_http() {
            self.http_cooldown
        } else {
            self.decode_delay
        };
        let factor = 2u32.saturating_pow(attempt.min(16));
        let backoff = base.saturating_mul(factor);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }
}

pub struct FetchEngine {
    provider: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
}

impl FetchEngine {
    pub fn new(provider: Arc<dyn SearchProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the page `query` is positioned at.
    pub async fn fetch_page(
        &self,
        query: &SearchQuery,
        cancel: &CancelFlag,
        log: &JobLog,
    ) -> Result<PageResult, FetchError> {
        let page = query.page();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let error = match self.provider.search_page(query).await {
                Ok(SearchPage::Results(entries)) => {
                    debug!(page, count = entries.len(), "Page fetched");
                    return Ok(PageResult::Items(
                        entries.into_iter().map(raw_item).collect(),
                    ));
                }
                Ok(SearchPage::Exhausted) => {
                    debug!(page, "Results key absent, query exhausted");
                    return Ok(PageResult::EndOfResults);
                }
                Err(source @ ScraperApiError::InvalidRequest(_)) => {
                    return Err(FetchError::Rejected { page, source });
                }
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= max_attempts {
                return Err(FetchError::Exhausted {
                    page,
                    attempts: attempt,
                    last_error: error,
                });
            }

            let backoff = self.policy.backoff(&error, attempt - 1);
            warn!(
                page,
                attempt,
                backoff_secs = backoff.as_secs_f64(),
                error = %error,
                "Search page failed, retrying same page after backoff"
            );
            log.record(format!(
                "page {page}: attempt {attempt}/{max_attempts} failed ({error}), retrying"
            ));

            if !cancel.sleep(backoff).await {
                return Err(FetchError::Cancelled);
            }
        }
    }
}

/// Wrap one provider entry, keeping the entry itself for the raw artifact.
pub fn raw_item(entry: serde_json::Value) -> RawItem {
    let result = OrganicResult::from_value(&entry);
    let permalink = result.permalink().map(str::to_string);
    RawItem::new(
        result.title.unwrap_or_default(),
        result.snippet.unwrap_or_default(),
        permalink,
        entry,
    )
}
