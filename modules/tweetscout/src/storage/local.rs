use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use tweetscout_common::{ArtifactRef, Protocol, TweetscoutError};

use crate::error::RegistrationError;
use crate::traits::ArtifactStore;

/// File-system repository. An artifact lives at `<root>/<logical_path>`.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical path of an artifact.
    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        artifact
            .logical_path()
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Inverse of [`LocalRepository::path_for`].
    pub fn artifact_for(
        &self,
        protocol: Protocol,
        name: impl Into<String>,
        path: &Path,
    ) -> Result<ArtifactRef, RegistrationError> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            TweetscoutError::LogicalPath(format!(
                "{} is outside {}",
                path.display(),
                self.root.display()
            ))
        })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(s) => segments.push(s.to_string_lossy().into_owned()),
                _ => {
                    return Err(TweetscoutError::LogicalPath(format!(
                        "{} is not a plain relative path",
                        relative.display()
                    ))
                    .into());
                }
            }
        }

        Ok(ArtifactRef::from_logical_path(
            protocol,
            name,
            &segments.join("/"),
        )?)
    }
}

#[async_trait]
impl ArtifactStore for LocalRepository {
    async fn register(
        &self,
        artifact: &ArtifactRef,
        job_id: u64,
        local_file: &Path,
    ) -> Result<(), RegistrationError> {
        if artifact.job_id != job_id {
            return Err(RegistrationError::JobMismatch {
                artifact_job: artifact.job_id,
                job_id,
            });
        }

        let target = self.path_for(artifact);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RegistrationError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::copy(local_file, &target)
            .await
            .map_err(|source| RegistrationError::Io {
                path: local_file.to_path_buf(),
                source,
            })?;

        info!(artifact = %artifact, path = %target.display(), "Artifact stored");
        Ok(())
    }
}
