//! Pipeline orchestrator.
//!
//! One job walks the search pages in order. Every item of a page goes
//! through filter, extract and geocode; only items that pass all three become
//! an `EnrichedRecord`. Each page's raw batch is written and registered as
//! soon as the page is done. When the provider reports the end of results,
//! the accumulated raw items and the enriched table are written and
//! registered, and the job finishes.
//!
//! `run` never returns an error and never panics: every failure ends up as
//! a FAILED `JobOutcome` with a message trail.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info_span, Instrument};
use tweetscout_common::{
    ArtifactRef, ArtifactScope, DataSource, EnrichedRecord, JobOutcome, JobState, Protocol,
    RawItem, RunStage, SearchQuery,
};

use crate::cancel::CancelFlag;
use crate::error::{FetchError, PipelineError, WriteError};
use crate::extractor::format_item_text;
use crate::fetch::{FetchEngine, PageResult, RetryPolicy};
use crate::geocoder::CachedGeocoder;
use crate::job_log::JobLog;
use crate::registry::JobRegistry;
use crate::traits::{ArtifactStore, FactExtractor, Geocoder, SearchProvider};
use crate::writer::ArtifactWriter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// External collaborators of a pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub search: Arc<dyn SearchProvider>,
    pub extractor: Arc<dyn FactExtractor>,
    pub geocoder: Arc<dyn Geocoder>,
    pub store: Arc<dyn ArtifactStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    /// Pause after every fetched page, for the provider's rate limit.
    pub page_delay: Duration,
    pub protocol: Protocol,
    pub source: DataSource,
    /// Parent of the per-job scratch directories.
    pub work_dir: PathBuf,
}

impl PipelineSettings {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_delay: Duration::from_secs(1),
            protocol: Protocol::Local,
            source: DataSource::Twitter,
            work_dir: work_dir.into(),
        }
    }

    /// No pauses anywhere. For tests.
    pub fn immediate(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            retry: RetryPolicy::immediate(RetryPolicy::default().max_attempts),
            page_delay: Duration::ZERO,
            ..Self::new(work_dir)
        }
    }
}

/// What to scrape.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: u64,
    pub tracer_id: String,
    /// Positioned at the first page to fetch.
    pub query: SearchQuery,
    /// Topic handed to the relevance filter.
    pub filter_topic: String,
}

// ---------------------------------------------------------------------------
// JobTracker
// ---------------------------------------------------------------------------

/// Lifecycle state of one run. `finish` and `fail` consume the tracker, so a
/// job is finalized exactly once.
#[derive(Debug)]
pub struct JobTracker {
    job_id: u64,
    tracer_id: String,
    state: JobState,
    artifacts: Vec<ArtifactRef>,
}

impl JobTracker {
    pub fn new(job_id: u64, tracer_id: impl Into<String>) -> Self {
        Self {
            job_id,
            tracer_id: tracer_id.into(),
            state: JobState::Created,
            artifacts: Vec::new(),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = JobState::running();
    }

    pub fn enter(&mut self, stage: RunStage) {
        self.state = JobState::Running { stage: Some(stage) };
    }

    pub fn record_artifact(&mut self, artifact: ArtifactRef) {
        self.artifacts.push(artifact);
    }

    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    /// Most recent artifact that was fully written.
    pub fn last_good(&self) -> Option<&ArtifactRef> {
        self.artifacts.last()
    }

    pub fn finish(self, messages: Vec<String>) -> JobOutcome {
        self.into_outcome(JobState::Finished, messages)
    }

    pub fn fail(self, messages: Vec<String>) -> JobOutcome {
        self.into_outcome(JobState::Failed, messages)
    }

    fn into_outcome(self, state: JobState, messages: Vec<String>) -> JobOutcome {
        JobOutcome {
            job_id: self.job_id,
            tracer_id: self.tracer_id,
            state,
            artifacts: self.artifacts,
            messages,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    deps: PipelineDeps,
    settings: PipelineSettings,
    writer: ArtifactWriter,
    registry: Option<Arc<JobRegistry>>,
}

/// Per-run state threaded through the page loop.
struct RunContext<'a> {
    spec: &'a JobSpec,
    scope: ArtifactScope,
    scratch: PathBuf,
    cancel: &'a CancelFlag,
    log: &'a JobLog,
    geocoder: CachedGeocoder<Arc<dyn Geocoder>>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        Self {
            deps,
            settings,
            writer: ArtifactWriter::new(),
            registry: None,
        }
    }

    /// Mirror stage changes and the final outcome into `registry`.
    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Scratch directory owned by one job.
    pub fn scratch_dir(&self, job_id: u64) -> PathBuf {
        self.settings.work_dir.join(format!("job-{job_id}"))
    }

    pub async fn run(&self, spec: &JobSpec, cancel: CancelFlag) -> JobOutcome {
        let span = info_span!("scrape_job", job_id = spec.job_id, tracer_id = %spec.tracer_id);
        self.run_job(spec, cancel).instrument(span).await
    }

    async fn run_job(&self, spec: &JobSpec, cancel: CancelFlag) -> JobOutcome {
        let log = JobLog::new(spec.job_id);
        let mut tracker = JobTracker::new(spec.job_id, spec.tracer_id.clone());
        let scratch = self.scratch_dir(spec.job_id);

        log.info(format!(
            "Starting job for '{}' ({} to {})",
            spec.query.query(),
            spec.query.start_date(),
            spec.query.end_date()
        ));

        let result = AssertUnwindSafe(self.execute(spec, &scratch, &cancel, &log, &mut tracker))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(PipelineError::Unhandled(panic_message(panic))));

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log.warn(format!("Failed to remove scratch dir {}: {e}", scratch.display()));
            }
        }

        let outcome = match result {
            Ok(()) => {
                log.info(format!(
                    "Job finished with {} artifacts",
                    tracker.artifacts().len()
                ));
                tracker.finish(log.into_messages())
            }
            Err(e) => {
                let last_good = tracker
                    .last_good()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "none".to_string());
                log.error(format!("Job failed: {e}. Last successful artifact: {last_good}"));
                tracker.fail(log.into_messages())
            }
        };

        if let Some(registry) = &self.registry {
            registry.record_outcome(spec.job_id, &outcome);
        }
        outcome
    }

    async fn execute(
        &self,
        spec: &JobSpec,
        scratch: &Path,
        cancel: &CancelFlag,
        log: &JobLog,
        tracker: &mut JobTracker,
    ) -> Result<(), PipelineError> {
        self.transition(spec.job_id, tracker, None);

        let scope = ArtifactScope::new(
            self.settings.protocol,
            self.settings.source,
            spec.tracer_id.clone(),
            spec.job_id,
        )
        .map_err(|e| PipelineError::Setup(e.to_string()))?;

        let ctx = RunContext {
            spec,
            scope,
            scratch: scratch.to_path_buf(),
            cancel,
            log,
            geocoder: CachedGeocoder::new(self.deps.geocoder.clone()),
        };
        let fetcher = FetchEngine::new(self.deps.search.clone(), self.settings.retry.clone());

        let mut query = spec.query.clone();
        let mut all_raw: Vec<serde_json::Value> = Vec::new();
        let mut records: Vec<EnrichedRecord> = Vec::new();

        loop {
            ensure_active(cancel)?;
            let page = query.page();
            self.transition(spec.job_id, tracker, Some(RunStage::Fetching { page }));

            let items = match fetcher.fetch_page(&query, cancel, log).await {
                Ok(PageResult::Items(items)) => items,
                Ok(PageResult::EndOfResults) => break,
                Err(FetchError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => return Err(e.into()),
            };
            log.info(format!("Page {page}: fetched {} items", items.len()));

            self.transition(spec.job_id, tracker, Some(RunStage::Augmenting { page }));
            for item in &items {
                ensure_active(cancel)?;
                if let Some(record) = self.augment(&ctx, item).await? {
                    records.push(record);
                }
            }

            self.transition(spec.job_id, tracker, Some(RunStage::Persisting { page }));
            let batch: Vec<serde_json::Value> = items.into_iter().map(|i| i.original).collect();
            let artifact = ctx.scope.scraped_page(page);
            self.persist(&ctx, tracker, artifact, |dest| {
                self.writer.write_batch(&batch, dest)
            })
            .await?;
            all_raw.extend(batch);

            query = query.next_page();
            if !cancel.sleep(self.settings.page_delay).await {
                return Err(PipelineError::Cancelled);
            }
        }

        log.info(format!(
            "No more results after page {}; {} items fetched, {} enriched",
            query.page(),
            all_raw.len(),
            records.len()
        ));
        self.transition(spec.job_id, tracker, Some(RunStage::Finalizing));

        let all = ctx.scope.scraped_all();
        self.persist(&ctx, tracker, all, |dest| {
            self.writer.write_batch(&all_raw, dest)
        })
        .await?;

        let augmented = ctx.scope.augmented();
        self.persist(&ctx, tracker, augmented, |dest| {
            self.writer.write_table(&records, dest)
        })
        .await?;

        Ok(())
    }

    /// filter -> extract -> geocode. `Ok(None)` drops the item; cancellation
    /// between steps aborts the job.
    async fn augment(
        &self,
        ctx: &RunContext<'_>,
        item: &RawItem,
    ) -> Result<Option<EnrichedRecord>, PipelineError> {
        let text = format_item_text(item);

        match self
            .deps
            .extractor
            .is_relevant(&text, &ctx.spec.filter_topic)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(title = item.title.as_str(), "Item not relevant, skipping");
                return Ok(None);
            }
            Err(e) => {
                ctx.log
                    .warn(format!("Relevance check failed for '{}': {e}", item.title));
                return Ok(None);
            }
        }

        ensure_active(ctx.cancel)?;
        let facts = match self.deps.extractor.extract_facts(&text).await {
            Ok(facts) => facts,
            Err(e) => {
                ctx.log
                    .warn(format!("Extraction failed for '{}': {e}", item.title));
                return Ok(None);
            }
        };

        ensure_active(ctx.cancel)?;
        let location = facts.location();
        let geo = ctx.geocoder.resolve(&location).await;
        if !geo.is_resolved() {
            ctx.log.record(format!("Could not geocode '{location}'"));
        }
        Ok(Some(EnrichedRecord::new(item, facts, geo)))
    }

    /// Write an artifact into scratch, then register it. The artifact counts
    /// as produced once the file is on disk; a registration failure is logged
    /// and the job carries on. Nothing is written or registered once the job
    /// is cancelled.
    async fn persist<W>(
        &self,
        ctx: &RunContext<'_>,
        tracker: &mut JobTracker,
        artifact: ArtifactRef,
        write: W,
    ) -> Result<(), PipelineError>
    where
        W: FnOnce(&Path) -> Result<(), WriteError>,
    {
        ensure_active(ctx.cancel)?;
        let dest = ctx.scratch.join(&artifact.relative_path);
        write(&dest)?;
        tracker.record_artifact(artifact.clone());

        ensure_active(ctx.cancel)?;
        match self
            .deps
            .store
            .register(&artifact, ctx.spec.job_id, &dest)
            .await
        {
            Ok(()) => ctx.log.info(format!("Registered {artifact}")),
            Err(e) => ctx.log.warn(format!("Registration of {artifact} failed: {e}")),
        }
        Ok(())
    }

    fn transition(&self, job_id: u64, tracker: &mut JobTracker, stage: Option<RunStage>) {
        match stage {
            Some(stage) => tracker.enter(stage),
            None => tracker.start(),
        }
        if let Some(registry) = &self.registry {
            let state = tracker.state();
            registry.update(job_id, |job| job.state = state);
        }
    }
}

fn ensure_active(cancel: &CancelFlag) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
