pub mod artifact;
pub mod config;
pub mod error;
pub mod job;
pub mod types;

pub use artifact::{ArtifactRef, ArtifactScope, DataSource, Protocol};
pub use config::{CatalogConfig, Config};
pub use error::TweetscoutError;
pub use job::{Job, JobOutcome, JobState, RunStage};
pub use types::*;
