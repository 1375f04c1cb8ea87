//! Audio acquisition engine
//!
//! Turns a validated source reference into a local audio artifact under a
//! bounded retry policy and a size ceiling. At most one artifact exists per
//! call; every exit path removes partial output, and the returned
//! [`Artifact`] deletes its file on drop so the orchestrator's
//! deletion-after-delivery guarantee holds on success and failure alike.

use crate::providers::{SourceProvider, SourceReference};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tunedrop_common::{Error, Result, RetryPolicy};
use uuid::Uuid;

/// Fetch attempt bound. A blocked signature mid-fetch is retried like a
/// transient failure and counts against the same bound.
pub const FETCH_ATTEMPTS: u32 = 3;

const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Strip a destination-name hint to alphanumeric, space, underscore, hyphen.
pub fn sanitize_name_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();

    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "track".to_string()
    } else {
        cleaned
    }
}

/// A fetched local audio file. The file is removed when the guard drops;
/// whoever holds the guard owns deletion-after-delivery.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    size_bytes: u64,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove artifact");
            }
        }
    }
}

/// Fetches validated sources into scoped temporary artifacts.
pub struct AcquisitionEngine {
    provider: Arc<dyn SourceProvider>,
    temp_dir: PathBuf,
    max_artifact_bytes: u64,
    retry: RetryPolicy,
}

impl AcquisitionEngine {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        temp_dir: PathBuf,
        max_artifact_bytes: u64,
    ) -> Result<Self> {
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            provider,
            temp_dir,
            max_artifact_bytes,
            retry: RetryPolicy::new(FETCH_ATTEMPTS, FETCH_RETRY_DELAY),
        })
    }

    /// Fetch the referenced media into the temp directory.
    ///
    /// Transient failures (network, timeout, reported-success-with-no-file)
    /// and blocked signatures are retried up to [`FETCH_ATTEMPTS`]; an
    /// artifact over the size ceiling is deleted immediately and surfaces as
    /// `TooLarge` without retry.
    pub async fn fetch(&self, source: &SourceReference, name_hint: &str) -> Result<Artifact> {
        let file_name = format!("{}-{}.m4a", sanitize_name_hint(name_hint), Uuid::new_v4());
        let dest = self.temp_dir.join(file_name);

        tracing::info!(
            uri = %source.locator_uri,
            dest = %dest.display(),
            "Starting media fetch"
        );

        let result = self
            .retry
            .run_if(
                "media fetch",
                |e| e.is_transient() || matches!(e, Error::SourceBlocked),
                || self.attempt(source, &dest),
            )
            .await;

        if result.is_err() {
            // Each attempt cleans up after itself; this covers interrupted
            // cleanup so no orphan survives the final failure.
            discard_partial(&dest).await;
        }

        result
    }

    async fn attempt(&self, source: &SourceReference, dest: &Path) -> Result<Artifact> {
        if let Err(err) = self.provider.fetch(&source.locator_uri, dest).await {
            discard_partial(dest).await;
            return Err(err);
        }

        let metadata = match tokio::fs::metadata(dest).await {
            Ok(metadata) => metadata,
            Err(_) => {
                return Err(Error::Network(
                    "download reported success but produced no file".into(),
                ));
            }
        };

        let size_bytes = metadata.len();
        if size_bytes > self.max_artifact_bytes {
            tracing::warn!(
                size_bytes,
                limit_bytes = self.max_artifact_bytes,
                "Artifact over size ceiling, deleting"
            );
            discard_partial(dest).await;
            return Err(Error::TooLarge {
                size_bytes,
                limit_bytes: self.max_artifact_bytes,
            });
        }

        tracing::info!(size_bytes, dest = %dest.display(), "Media fetch complete");

        Ok(Artifact {
            path: dest.to_path_buf(),
            size_bytes,
        })
    }
}

async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => tracing::debug!(dest = %dest.display(), "Removed partial artifact"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(dest = %dest.display(), error = %err, "Failed to remove partial artifact");
        }
    }
}
