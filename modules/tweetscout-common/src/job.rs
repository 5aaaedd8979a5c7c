use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;

/// Job lifecycle. `Created` and `Running` are transient; every job ends in
/// exactly one of `Finished` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<RunStage>,
    },
    Finished,
    Failed,
}

impl JobState {
    pub fn running() -> Self {
        JobState::Running { stage: None }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Running { .. } => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }
}

/// What a running scrape job is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStage {
    Fetching { page: u32 },
    Augmenting { page: u32 },
    Persisting { page: u32 },
    Finalizing,
}

/// Final record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: u64,
    pub tracer_id: String,
    pub state: JobState,
    /// Artifacts in creation order.
    pub artifacts: Vec<ArtifactRef>,
    /// Human-readable trail of what happened, oldest first.
    pub messages: Vec<String>,
}

/// Bookkeeping record for a job held by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub tracer_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub heartbeat: DateTime<Utc>,
    pub state: JobState,
    pub messages: Vec<String>,
    pub output_artifacts: Vec<ArtifactRef>,
}

impl Job {
    pub fn new(id: u64, tracer_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            tracer_id: tracer_id.into(),
            name: format!("twitter-{id}"),
            created_at: now,
            heartbeat: now,
            state: JobState::Created,
            messages: Vec::new(),
            output_artifacts: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.heartbeat = Utc::now();
    }

    /// Copy a finished run's state, trail and artifacts onto the record.
    pub fn apply_outcome(&mut self, outcome: &JobOutcome) {
        self.state = outcome.state;
        self.messages = outcome.messages.clone();
        self.output_artifacts = outcome.artifacts.clone();
        self.touch();
    }
}
