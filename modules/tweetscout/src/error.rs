use std::path::PathBuf;

use ai_client::AiError;
use scraperapi_client::ScraperApiError;
use thiserror::Error;
use tweetscout_common::TweetscoutError;

/// A page could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page {page}: gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        page: u32,
        attempts: u32,
        last_error: ScraperApiError,
    },

    /// The provider refused the request itself; retrying cannot help.
    #[error("page {page}: request rejected: {source}")]
    Rejected {
        page: u32,
        #[source]
        source: ScraperApiError,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

/// One item could not be filtered or extracted. The item is dropped.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The model answered with something that does not fit the schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("extraction provider failed: {0}")]
    Provider(String),
}

impl From<AiError> for ExtractionError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Parse(msg) => ExtractionError::SchemaViolation(msg),
            other => ExtractionError::Provider(other.to_string()),
        }
    }
}

impl From<TweetscoutError> for ExtractionError {
    fn from(err: TweetscoutError) -> Self {
        ExtractionError::SchemaViolation(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Registering an artifact failed. Never fatal to a job.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("storage I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog unreachable: {0}")]
    Unreachable(String),

    #[error("catalog rejected registration (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("artifact belongs to job {artifact_job}, registered under job {job_id}")]
    JobMismatch { artifact_job: u64, job_id: u64 },

    #[error(transparent)]
    Path(#[from] TweetscoutError),
}

impl From<reqwest::Error> for RegistrationError {
    fn from(err: reqwest::Error) -> Self {
        RegistrationError::Unreachable(err.to_string())
    }
}

/// Why a job ended in FAILED.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("job setup failed: {0}")]
    Setup(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("unhandled error: {0}")]
    Unhandled(String),
}
