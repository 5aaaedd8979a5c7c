// Test mocks for the scrape pipeline.
//
// Four mocks matching the four trait boundaries:
// - MockSearch (SearchProvider): per-page scripted responses
// - MockExtractor (FactExtractor): title-keyed verdicts and facts
// - MockGeocoder (Geocoder): place→point map, counts lookups
// - MockStore (ArtifactStore): records registrations, can be made to fail
//
// Plus helpers for building provider entries, facts and job specs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use scraperapi_client::{ScraperApiError, SearchPage};
use tweetscout_common::{ArtifactRef, ExtractedFacts, GeoPoint, Month, SearchQuery};

use crate::cancel::CancelFlag;
use crate::error::{ExtractionError, RegistrationError};
use crate::pipeline::JobSpec;
use crate::traits::{ArtifactStore, FactExtractor, Geocoder, SearchProvider};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Provider entry with a predictable title: `"Tweet <page>-<n>"`.
pub fn tweet(page: u32, n: usize) -> Value {
    json!({
        "position": n,
        "title": tweet_title(page, n),
        "snippet": format!("Flames seen from the highway, stay safe @reporter{n}"),
        "link": format!("https://twitter.com/reporter{n}/status/{page}{n:03}"),
    })
}

pub fn tweet_title(page: u32, n: usize) -> String {
    format!("Tweet {page}-{n}")
}

/// `count` entries for `page`, numbered from 1.
pub fn tweets(page: u32, count: usize) -> Vec<Value> {
    (1..=count).map(|n| tweet(page, n)).collect()
}

pub fn sample_facts() -> ExtractedFacts {
    ExtractedFacts {
        city: "Los Angeles".into(),
        country: "USA".into(),
        year: 2024,
        month: Month::March,
        day: "12".into(),
        disaster_type: "wildfire".into(),
    }
}

/// Job over `query` for 2024-03-10..2024-03-15, filtering on "wildfire".
pub fn job_spec(job_id: u64, query: &str) -> JobSpec {
    JobSpec {
        job_id,
        tracer_id: format!("tracer-{job_id}"),
        query: SearchQuery::parse(query, "2024-03-10", "2024-03-15")
            .expect("valid test query"),
        filter_topic: "wildfire".into(),
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Step {
    Results(Vec<Value>),
    Http(u16),
    Decode,
}

/// Scripted search provider. Each page plays its steps in order and keeps
/// repeating the last one. Pages with no script answer with no results key.
pub struct MockSearch {
    scripts: Mutex<HashMap<u32, VecDeque<Step>>>,
    requests: Mutex<Vec<u32>>,
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, page: u32, step: Step) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(step);
        self
    }

    pub fn on_page(self, page: u32, entries: Vec<Value>) -> Self {
        self.push(page, Step::Results(entries))
    }

    /// Answer `page` with HTTP `status`, `times` times.
    pub fn on_page_http_error(mut self, page: u32, status: u16, times: usize) -> Self {
        for _ in 0..times {
            self = self.push(page, Step::Http(status));
        }
        self
    }

    pub fn on_page_garbled(self, page: u32) -> Self {
        self.push(page, Step::Decode)
    }

    /// Pages requested so far, in order.
    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage, ScraperApiError> {
        let page = query.page();
        self.requests.lock().unwrap().push(page);

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&page) {
                None => return Ok(SearchPage::Exhausted),
                Some(steps) if steps.len() > 1 => steps.pop_front(),
                Some(steps) => steps.front().cloned(),
            }
        };

        match step {
            None => Ok(SearchPage::Exhausted),
            Some(Step::Results(entries)) => Ok(SearchPage::Results(entries)),
            Some(Step::Http(status)) => Err(ScraperApiError::Api {
                status,
                message: "mock failure".into(),
            }),
            Some(Step::Decode) => Err(ScraperApiError::Decode("mock garbled body".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Everything is relevant and yields [`sample_facts`] unless configured
/// otherwise. Items are recognised by their title.
pub struct MockExtractor {
    irrelevant: HashSet<String>,
    filter_errors: HashSet<String>,
    schema_errors: HashSet<String>,
    facts: HashMap<String, ExtractedFacts>,
    panic_on: Option<String>,
    cancel_on: Option<(String, CancelFlag)>,
    filter_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            irrelevant: HashSet::new(),
            filter_errors: HashSet::new(),
            schema_errors: HashSet::new(),
            facts: HashMap::new(),
            panic_on: None,
            cancel_on: None,
            filter_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn irrelevant(mut self, title: &str) -> Self {
        self.irrelevant.insert(title.to_string());
        self
    }

    pub fn filter_error(mut self, title: &str) -> Self {
        self.filter_errors.insert(title.to_string());
        self
    }

    pub fn schema_error(mut self, title: &str) -> Self {
        self.schema_errors.insert(title.to_string());
        self
    }

    pub fn with_facts(mut self, title: &str, facts: ExtractedFacts) -> Self {
        self.facts.insert(title.to_string(), facts);
        self
    }

    /// Panic while filtering this item.
    pub fn panic_on(mut self, title: &str) -> Self {
        self.panic_on = Some(title.to_string());
        self
    }

    /// Cancel `flag` while filtering this item; the verdict is still "relevant".
    pub fn cancel_on(mut self, title: &str, flag: CancelFlag) -> Self {
        self.cancel_on = Some((title.to_string(), flag));
        self
    }

    pub fn filter_calls(&self) -> usize {
        self.filter_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

fn title_of(item_text: &str) -> &str {
    item_text
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Title: "))
        .unwrap_or_default()
}

#[async_trait]
impl FactExtractor for MockExtractor {
    async fn is_relevant(&self, item_text: &str, _topic: &str) -> Result<bool, ExtractionError> {
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        let title = title_of(item_text);
        if self.panic_on.as_deref() == Some(title) {
            panic!("MockExtractor: asked to panic on {title}");
        }
        if let Some((_, flag)) = self.cancel_on.as_ref().filter(|(t, _)| t == title) {
            flag.cancel();
        }
        if self.filter_errors.contains(title) {
            return Err(ExtractionError::Provider(format!("MockExtractor: filter failed for {title}")));
        }
        Ok(!self.irrelevant.contains(title))
    }

    async fn extract_facts(&self, item_text: &str) -> Result<ExtractedFacts, ExtractionError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let title = title_of(item_text);
        if self.schema_errors.contains(title) {
            return Err(ExtractionError::SchemaViolation(format!(
                "MockExtractor: month 'Smarch' is not a month ({title})"
            )));
        }
        Ok(self.facts.get(title).cloned().unwrap_or_else(sample_facts))
    }
}

// ---------------------------------------------------------------------------
// MockGeocoder
// ---------------------------------------------------------------------------

/// Unknown places resolve to `Unresolved`, like a failed lookup would.
pub struct MockGeocoder {
    places: HashMap<String, GeoPoint>,
    lookups: Mutex<Vec<String>>,
}

impl Default for MockGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self {
            places: HashMap::new(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn on_place(mut self, place: &str, latitude: f64, longitude: f64) -> Self {
        self.places.insert(
            place.to_string(),
            GeoPoint::Resolved {
                latitude,
                longitude,
            },
        );
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn resolve(&self, place: &str) -> GeoPoint {
        self.lookups.lock().unwrap().push(place.to_string());
        self.places.get(place).copied().unwrap_or(GeoPoint::Unresolved)
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// One `register` call as the store saw it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub artifact: ArtifactRef,
    pub job_id: u64,
    pub local_file: PathBuf,
    /// File content at registration time, if the file existed.
    pub content: Option<String>,
    pub accepted: bool,
}

pub struct MockStore {
    failing: HashSet<String>,
    fail_all: bool,
    registrations: Mutex<Vec<Registration>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            fail_all: false,
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Reject registrations of the artifact with this logical name.
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn content_of(&self, name: &str) -> Option<String> {
        self.registrations()
            .into_iter()
            .find(|r| r.artifact.name == name)
            .and_then(|r| r.content)
    }
}

#[async_trait]
impl ArtifactStore for MockStore {
    async fn register(
        &self,
        artifact: &ArtifactRef,
        job_id: u64,
        local_file: &Path,
    ) -> Result<(), RegistrationError> {
        let accepted = !(self.fail_all || self.failing.contains(&artifact.name));
        self.registrations.lock().unwrap().push(Registration {
            artifact: artifact.clone(),
            job_id,
            local_file: local_file.to_path_buf(),
            content: std::fs::read_to_string(local_file).ok(),
            accepted,
        });

        if accepted {
            Ok(())
        } else {
            Err(RegistrationError::Rejected {
                status: 503,
                message: format!("MockStore: refusing {}", artifact.name),
            })
        }
    }
}
