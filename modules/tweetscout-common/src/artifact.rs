//! Artifact naming.
//!
//! Every file the pipeline produces is addressed by a logical path of the form
//! `<source>/<tracer_id>/<job_id>/<relative_path>`. Storage adapters map that
//! path onto their physical layout and back, so the mapping must stay
//! invertible: tracer ids never contain `/` and relative paths are never
//! absolute or empty.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TweetscoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Twitter,
    Telegram,
    Sentinel,
    AugmentedData,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Twitter => "twitter",
            DataSource::Telegram => "telegram",
            DataSource::Sentinel => "sentinel",
            DataSource::AugmentedData => "augmented_data",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = TweetscoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" => Ok(DataSource::Twitter),
            "telegram" => Ok(DataSource::Telegram),
            "sentinel" => Ok(DataSource::Sentinel),
            "augmented_data" => Ok(DataSource::AugmentedData),
            other => Err(TweetscoutError::Validation(format!("unknown data source '{other}'"))),
        }
    }
}

/// Storage protocol an artifact is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    S3,
    Es,
    Local,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::S3 => "s3",
            Protocol::Es => "es",
            Protocol::Local => "local",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = TweetscoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Protocol::S3),
            "es" => Ok(Protocol::Es),
            "local" => Ok(Protocol::Local),
            other => Err(TweetscoutError::Validation(format!("unknown storage protocol '{other}'"))),
        }
    }
}

/// The part of an artifact's address shared by everything one job writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactScope {
    protocol: Protocol,
    source: DataSource,
    tracer_id: String,
    job_id: u64,
}

impl ArtifactScope {
    pub fn new(
        protocol: Protocol,
        source: DataSource,
        tracer_id: impl Into<String>,
        job_id: u64,
    ) -> Result<Self, TweetscoutError> {
        let tracer_id = tracer_id.into();
        validate_tracer_id(&tracer_id)?;
        Ok(Self {
            protocol,
            source,
            tracer_id,
            job_id,
        })
    }

    pub fn tracer_id(&self) -> &str {
        &self.tracer_id
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Raw results of one page: `scraped/tweet_<page>.json`.
    pub fn scraped_page(&self, page: u32) -> ArtifactRef {
        self.artifact(format!("tweet_{page}"), format!("scraped/tweet_{page}.json"))
    }

    /// Raw results of every page: `scraped/tweet_all.json`.
    pub fn scraped_all(&self) -> ArtifactRef {
        self.artifact("tweet_all", "scraped/tweet_all.json")
    }

    /// Enriched table: `augmented/data.json`.
    pub fn augmented(&self) -> ArtifactRef {
        self.artifact("augmented_data", "augmented/data.json")
    }

    fn artifact(&self, name: impl Into<String>, relative_path: impl Into<String>) -> ArtifactRef {
        ArtifactRef {
            name: name.into(),
            protocol: self.protocol,
            source: self.source,
            tracer_id: self.tracer_id.clone(),
            job_id: self.job_id,
            relative_path: relative_path.into(),
        }
    }
}

/// Logical reference to one produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub name: String,
    pub protocol: Protocol,
    pub source: DataSource,
    pub tracer_id: String,
    pub job_id: u64,
    pub relative_path: String,
}

impl ArtifactRef {
    /// `<source>/<tracer_id>/<job_id>/<relative_path>`
    pub fn logical_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.source, self.tracer_id, self.job_id, self.relative_path
        )
    }

    /// Inverse of [`ArtifactRef::logical_path`].
    pub fn from_logical_path(
        protocol: Protocol,
        name: impl Into<String>,
        path: &str,
    ) -> Result<Self, TweetscoutError> {
        let bad = |why: &str| TweetscoutError::LogicalPath(format!("{path}: {why}"));

        let mut parts = path.trim_start_matches('/').splitn(4, '/');
        let source = parts.next().ok_or_else(|| bad("missing source"))?;
        let tracer_id = parts.next().ok_or_else(|| bad("missing tracer id"))?;
        let job_id = parts.next().ok_or_else(|| bad("missing job id"))?;
        let relative_path = parts.next().ok_or_else(|| bad("missing relative path"))?;

        if relative_path.is_empty() {
            return Err(bad("empty relative path"));
        }
        validate_tracer_id(tracer_id)?;

        Ok(Self {
            name: name.into(),
            protocol,
            source: source.parse().map_err(|_| bad("unknown source"))?,
            tracer_id: tracer_id.to_string(),
            job_id: job_id.parse().map_err(|_| bad("job id is not a number"))?,
            relative_path: relative_path.to_string(),
        })
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.logical_path())
    }
}

fn validate_tracer_id(tracer_id: &str) -> Result<(), TweetscoutError> {
    if tracer_id.is_empty() || tracer_id.contains('/') || tracer_id.contains("..") {
        return Err(TweetscoutError::Validation(format!(
            "tracer id '{tracer_id}' must be non-empty and contain no '/' or '..'"
        )));
    }
    Ok(())
}
