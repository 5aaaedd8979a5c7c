//! End-to-end runs of the pipeline against the in-memory mocks.
//!
//! No network, no credentials: every collaborator is scripted.

use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use tweetscout::testing::{
    job_spec, sample_facts, tweet_title, tweets, MockExtractor, MockGeocoder, MockSearch,
    MockStore,
};
use tweetscout::{CancelFlag, JobRegistry, Pipeline, PipelineDeps, PipelineSettings};
use tweetscout_common::{JobOutcome, JobState};

struct Harness {
    search: Arc<MockSearch>,
    extractor: Arc<MockExtractor>,
    geocoder: Arc<MockGeocoder>,
    store: Arc<MockStore>,
    work: TempDir,
}

impl Harness {
    fn new(search: MockSearch) -> Self {
        Self {
            search: Arc::new(search),
            extractor: Arc::new(MockExtractor::new()),
            geocoder: Arc::new(MockGeocoder::new().on_place("Los Angeles,USA", 34.05, -118.24)),
            store: Arc::new(MockStore::new()),
            work: tempfile::tempdir().unwrap(),
        }
    }

    fn extractor(mut self, extractor: MockExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    fn geocoder(mut self, geocoder: MockGeocoder) -> Self {
        self.geocoder = Arc::new(geocoder);
        self
    }

    fn store(mut self, store: MockStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_in(PipelineSettings::immediate(self.work.path()))
    }

    fn pipeline_in(&self, settings: PipelineSettings) -> Pipeline {
        let deps = PipelineDeps {
            search: self.search.clone(),
            extractor: self.extractor.clone(),
            geocoder: self.geocoder.clone(),
            store: self.store.clone(),
        };
        Pipeline::new(deps, settings)
    }

    async fn run(&self) -> JobOutcome {
        self.pipeline().run(&job_spec(1, "wildfire"), CancelFlag::new()).await
    }

    fn stored_json(&self, name: &str) -> Value {
        let content = self
            .store
            .content_of(name)
            .unwrap_or_else(|| panic!("{name} was never registered with content"));
        serde_json::from_str(&content).unwrap()
    }
}

fn names(outcome: &JobOutcome) -> Vec<&str> {
    outcome.artifacts.iter().map(|a| a.name.as_str()).collect()
}

fn trail_mentions(outcome: &JobOutcome, needle: &str) -> bool {
    outcome.messages.iter().any(|m| m.contains(needle))
}

// ---------------------------------------------------------------------------
// Scenario A: two full pages, then no results key
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_pages_then_end_of_results_finishes_with_four_artifacts() {
    let h = Harness::new(
        MockSearch::new()
            .on_page(1, tweets(1, 10))
            .on_page(2, tweets(2, 10)),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(outcome.tracer_id, "tracer-1");
    assert_eq!(
        names(&outcome),
        vec!["tweet_1", "tweet_2", "tweet_all", "augmented_data"]
    );
    assert_eq!(
        outcome.artifacts[0].logical_path(),
        "twitter/tracer-1/1/scraped/tweet_1.json"
    );
    assert_eq!(
        outcome.artifacts[3].logical_path(),
        "twitter/tracer-1/1/augmented/data.json"
    );

    // Page 3 answered without a results key; page 4 is never asked for.
    assert_eq!(h.search.requests(), vec![1, 2, 3]);

    let all = h.stored_json("tweet_all");
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 20);
    assert_eq!(all[0]["item_number"], 1);
    assert_eq!(all[19]["item_number"], 20);
    assert_eq!(all[10]["item"]["title"], tweet_title(2, 1));

    let page2 = h.stored_json("tweet_2");
    assert_eq!(page2.as_array().unwrap().len(), 10);
    assert_eq!(page2[0]["item_number"], 1);

    let table = h.stored_json("augmented_data");
    let rows = table.as_object().unwrap();
    assert_eq!(rows.len(), 20);
    assert_eq!(rows["0"]["Title"], tweet_title(1, 1));
    assert_eq!(rows["19"]["Title"], tweet_title(2, 10));
    assert_eq!(rows["5"]["Extracted_Location"], "Los Angeles,USA");
    assert_eq!(rows["5"]["Resolved_Latitude"], 34.05);
    assert_eq!(rows["5"]["Month"], "March");
    assert_eq!(rows["5"]["Day"], "12");
    assert_eq!(rows["5"]["Year"], 2024);

    // Every registration saw a complete file, under the right job.
    let registrations = h.store.registrations();
    assert_eq!(registrations.len(), 4);
    assert!(registrations.iter().all(|r| r.content.is_some() && r.job_id == 1));

    // One distinct place, one lookup.
    assert_eq!(h.geocoder.lookups(), vec!["Los Angeles,USA"]);

    assert!(!h.work.path().join("job-1").exists(), "scratch dir must be removed");
}

#[tokio::test]
async fn end_of_results_on_first_page_writes_empty_final_artifacts() {
    let h = Harness::new(MockSearch::new());

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(names(&outcome), vec!["tweet_all", "augmented_data"]);
    assert_eq!(h.search.requests(), vec![1]);
    assert_eq!(h.stored_json("tweet_all"), serde_json::json!([]));
    assert_eq!(h.stored_json("augmented_data"), serde_json::json!({}));
}

#[tokio::test]
async fn empty_results_page_advances_to_next_page() {
    let h = Harness::new(
        MockSearch::new()
            .on_page(1, vec![])
            .on_page(2, tweets(2, 1)),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(h.search.requests(), vec![1, 2, 3]);
    assert_eq!(
        names(&outcome),
        vec!["tweet_1", "tweet_2", "tweet_all", "augmented_data"]
    );
}

// ---------------------------------------------------------------------------
// Scenario B: HTTP failures retry the same page, bounded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persistent_http_500_fails_after_retry_budget_with_no_artifacts() {
    let h = Harness::new(MockSearch::new().on_page_http_error(1, 500, 1));

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.artifacts.is_empty());
    assert_eq!(h.search.requests(), vec![1, 1, 1, 1, 1]);
    assert!(h.store.registrations().is_empty());
    assert!(trail_mentions(&outcome, "gave up after 5 attempts"));
    assert!(!h.work.path().join("job-1").exists());
}

#[tokio::test]
async fn transient_http_errors_retry_same_page_then_continue() {
    let h = Harness::new(
        MockSearch::new()
            .on_page_http_error(1, 503, 2)
            .on_page(1, tweets(1, 3)),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(h.search.requests(), vec![1, 1, 1, 2]);
    assert_eq!(
        h.stored_json("tweet_1").as_array().unwrap().len(),
        3,
        "retries must not duplicate or skip items"
    );
}

#[tokio::test]
async fn garbled_bodies_are_retried_a_bounded_number_of_times() {
    let h = Harness::new(MockSearch::new().on_page_garbled(1));

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(h.search.requests().len(), 5);
}

#[tokio::test]
async fn retry_budget_follows_settings() {
    let h = Harness::new(MockSearch::new().on_page_http_error(1, 500, 1));
    let mut settings = PipelineSettings::immediate(h.work.path());
    settings.retry = settings.retry.with_max_attempts(2);

    let outcome = h
        .pipeline_in(settings)
        .run(&job_spec(1, "wildfire"), CancelFlag::new())
        .await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(h.search.requests(), vec![1, 1]);
}

#[tokio::test]
async fn failure_after_first_page_keeps_partial_artifacts() {
    let h = Harness::new(
        MockSearch::new()
            .on_page(1, tweets(1, 2))
            .on_page_http_error(2, 500, 1),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Failed);
    assert_eq!(names(&outcome), vec!["tweet_1"]);
    assert!(trail_mentions(&outcome, "Last successful artifact: local://twitter/tracer-1/1/scraped/tweet_1.json"));
    assert!(!h.work.path().join("job-1").exists());
}

// ---------------------------------------------------------------------------
// Scenario C: schema violations drop the record, not the raw item
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extraction_schema_error_drops_record_but_keeps_raw_item() {
    let bad = tweet_title(1, 2);
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 3)))
        .extractor(MockExtractor::new().schema_error(&bad));

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);

    let raw = h.stored_json("tweet_1");
    let titles: Vec<&str> = raw
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["item"]["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&bad.as_str()));

    let table = h.stored_json("augmented_data");
    let rows = table.as_object().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.values().all(|r| r["Title"] != bad.as_str()));
    assert_eq!(rows["1"]["Title"], tweet_title(1, 3), "rows are renumbered densely");

    assert!(trail_mentions(&outcome, "Extraction failed"));
}

#[tokio::test]
async fn irrelevant_and_unfilterable_items_are_never_extracted() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 4))).extractor(
        MockExtractor::new()
            .irrelevant(&tweet_title(1, 1))
            .filter_error(&tweet_title(1, 2)),
    );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(h.extractor.filter_calls(), 4);
    assert_eq!(h.extractor.extract_calls(), 2);
    assert_eq!(h.stored_json("augmented_data").as_object().unwrap().len(), 2);
    assert_eq!(h.stored_json("tweet_1").as_array().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Scenario D: geocoding failures keep the record with the sentinel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresolved_geocode_keeps_record_with_sentinel() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 2))).geocoder(MockGeocoder::new());

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    let table = h.stored_json("augmented_data");
    let rows = table.as_object().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows.values() {
        assert_eq!(row["Resolved_Latitude"], "unresolved");
        assert_eq!(row["Resolved_Longitude"], "unresolved");
        assert_eq!(row["Extracted_Location"], "Los Angeles,USA");
    }
}

#[tokio::test]
async fn each_distinct_place_is_geocoded_once_per_job() {
    let kyiv = tweetscout_common::ExtractedFacts {
        city: "Kyiv".into(),
        country: "Ukraine".into(),
        disaster_type: "flood".into(),
        ..sample_facts()
    };
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 3)).on_page(2, tweets(2, 2)))
        .extractor(
            MockExtractor::new()
                .with_facts(&tweet_title(1, 2), kyiv.clone())
                .with_facts(&tweet_title(2, 1), kyiv),
        )
        .geocoder(
            MockGeocoder::new()
                .on_place("Los Angeles,USA", 34.05, -118.24)
                .on_place("Kyiv,Ukraine", 50.45, 30.52),
        );

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(h.geocoder.lookups(), vec!["Los Angeles,USA", "Kyiv,Ukraine"]);

    let table = h.stored_json("augmented_data");
    assert_eq!(table["1"]["Extracted_Location"], "Kyiv,Ukraine");
    assert_eq!(table["1"]["Resolved_Latitude"], 50.45);
    assert_eq!(table["1"]["Disaster_Type"], "flood");
    assert_eq!(table["3"]["Resolved_Longitude"], 30.52);
    assert_eq!(table["4"]["Extracted_Location"], "Los Angeles,USA");
}

// ---------------------------------------------------------------------------
// Registration, write and top-level failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registration_failure_is_logged_and_job_still_finishes() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 1)))
        .store(MockStore::new().failing_for("tweet_1"));

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(names(&outcome), vec!["tweet_1", "tweet_all", "augmented_data"]);
    assert!(trail_mentions(&outcome, "Registration of local://twitter/tracer-1/1/scraped/tweet_1.json failed"));

    let accepted: Vec<bool> = h.store.registrations().iter().map(|r| r.accepted).collect();
    assert_eq!(accepted, vec![false, true, true]);
}

#[tokio::test]
async fn unreachable_store_still_produces_every_artifact() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 2)))
        .store(MockStore::new().always_failing());

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Finished);
    assert_eq!(names(&outcome), vec!["tweet_1", "tweet_all", "augmented_data"]);
    let registrations = h.store.registrations();
    assert_eq!(registrations.len(), 3);
    assert!(registrations.iter().all(|r| !r.accepted && r.content.is_some()));
    assert!(trail_mentions(&outcome, "Registration of local://twitter/tracer-1/1/augmented/data.json failed"));
}

#[tokio::test]
async fn unwritable_scratch_fails_the_job_before_registration() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 1)));
    let blocker = h.work.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let outcome = h
        .pipeline_in(PipelineSettings::immediate(&blocker))
        .run(&job_spec(1, "wildfire"), CancelFlag::new())
        .await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.artifacts.is_empty());
    assert!(h.store.registrations().is_empty());
    assert!(trail_mentions(&outcome, "failed to write"));
}

#[tokio::test]
async fn panic_inside_a_collaborator_becomes_failed_outcome() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 2)))
        .extractor(MockExtractor::new().panic_on(&tweet_title(1, 2)));

    let outcome = h.run().await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.artifacts.is_empty());
    assert!(trail_mentions(&outcome, "unhandled error"));
    assert!(!h.work.path().join("job-1").exists());
}

#[tokio::test]
async fn invalid_tracer_id_fails_without_fetching() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 1)));
    let mut spec = job_spec(1, "wildfire");
    spec.tracer_id = "a/b".into();

    let outcome = h.pipeline().run(&spec, CancelFlag::new()).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(h.search.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation and bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_job_fails_without_fetching() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 1)));
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = h.pipeline().run(&job_spec(1, "wildfire"), cancel).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(h.search.requests().is_empty());
    assert!(trail_mentions(&outcome, "cancelled"));
}

#[tokio::test]
async fn cancellation_mid_page_stops_before_anything_is_persisted() {
    let cancel = CancelFlag::new();
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 3)).on_page(2, tweets(2, 3)))
        .extractor(MockExtractor::new().cancel_on(&tweet_title(1, 2), cancel.clone()));

    let outcome = h.pipeline().run(&job_spec(1, "wildfire"), cancel).await;

    assert_eq!(outcome.state, JobState::Failed);
    assert!(outcome.artifacts.is_empty());
    assert!(h.store.registrations().is_empty());
    assert_eq!(h.search.requests(), vec![1]);
    // The item being filtered when the flag went up is never extracted.
    assert_eq!(h.extractor.filter_calls(), 2);
    assert_eq!(h.extractor.extract_calls(), 1);
    assert_eq!(h.geocoder.lookups().len(), 1);
    assert!(trail_mentions(&outcome, "job cancelled"));
    assert!(!h.work.path().join("job-1").exists());
}

#[tokio::test]
async fn registry_mirrors_the_final_outcome() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 2)));
    let registry = Arc::new(JobRegistry::new());
    registry.create_job_with_id(1, "tracer-1").unwrap();

    let outcome = h
        .pipeline()
        .with_registry(registry.clone())
        .run(&job_spec(1, "wildfire"), CancelFlag::new())
        .await;

    let job = registry.get_job(1).unwrap();
    assert_eq!(job.state, JobState::Finished);
    assert_eq!(job.output_artifacts, outcome.artifacts);
    assert_eq!(job.messages, outcome.messages);
}

#[tokio::test]
async fn concurrent_jobs_use_separate_scratch_dirs() {
    let h = Harness::new(MockSearch::new().on_page(1, tweets(1, 2)));
    let pipeline = h.pipeline();
    let (first, second) = (job_spec(1, "wildfire"), job_spec(2, "wildfire"));

    let (a, b) = tokio::join!(
        pipeline.run(&first, CancelFlag::new()),
        pipeline.run(&second, CancelFlag::new()),
    );

    assert_eq!(a.state, JobState::Finished);
    assert_eq!(b.state, JobState::Finished);
    let scratch_paths: Vec<_> = h
        .store
        .registrations()
        .iter()
        .map(|r| r.local_file.clone())
        .collect();
    assert!(scratch_paths.iter().any(|p| p.starts_with(h.work.path().join("job-1"))));
    assert!(scratch_paths.iter().any(|p| p.starts_with(h.work.path().join("job-2"))));
}
