//! Media source location
//!
//! Turns a track candidate into a validated, playable source reference by
//! walking an ordered list of query templates against the source provider.
//! First-match policy: the first candidate that passes the playback probe
//! wins, even if a later template might score "better". A structured
//! blocked signature aborts the whole call early; retrying against the same
//! automated-traffic defense is unproductive.

use crate::providers::{ProbeOutcome, SourceProvider, SourceReference, TrackCandidate};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tunedrop_common::{Error, Result};

/// Provisional results requested per query template.
pub const PROVISIONAL_RESULTS: usize = 3;

/// Pause between successive provider calls. Scheduling policy to stay under
/// automated-traffic defenses, not a correctness requirement.
const INTER_REQUEST_DELAY_MS: u64 = 500;

/// Query templates from most to least specific. Tried strictly in order,
/// never in parallel: an early specific match is preferred over a later
/// generic one.
fn query_ladder(title: &str, performer: &str) -> Vec<String> {
    let mut queries = Vec::with_capacity(3);
    if !performer.is_empty() {
        queries.push(format!("{title} {performer} official audio"));
        queries.push(format!("{title} {performer}"));
    }
    queries.push(format!("{title} audio"));
    queries
}

/// Enforces a minimum interval between outbound provider calls.
struct RequestPacer {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RequestPacer {
    /// Wait if necessary to honor the minimum interval.
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Pacing source provider: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Locates a validated playable source for a track candidate.
pub struct SourceLocator {
    provider: Arc<dyn SourceProvider>,
    pacer: RequestPacer,
}

impl SourceLocator {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self::with_pacing(provider, Duration::from_millis(INTER_REQUEST_DELAY_MS))
    }

    /// Custom inter-request interval; tests run unpaced.
    pub fn with_pacing(provider: Arc<dyn SourceProvider>, min_interval: Duration) -> Self {
        Self {
            provider,
            pacer: RequestPacer {
                last_request: Mutex::new(None),
                min_interval,
            },
        }
    }

    /// Locate a playable source for `candidate`.
    ///
    /// Returns the first probe-validated reference, `Err(NotFound)` when all
    /// templates are exhausted, or `Err(SourceBlocked)` as soon as the
    /// provider reports a blocked signature.
    pub async fn locate(
        &self,
        candidate_index: usize,
        candidate: &TrackCandidate,
    ) -> Result<SourceReference> {
        let queries = query_ladder(&candidate.title, candidate.primary_performer());

        for query in &queries {
            self.pacer.wait().await;

            let handles = match self.provider.search(query, PROVISIONAL_RESULTS).await {
                Ok(handles) => handles,
                Err(Error::SourceBlocked) => {
                    tracing::warn!(query = %query, "Source blocked during search, aborting templates");
                    return Err(Error::SourceBlocked);
                }
                Err(err) => {
                    tracing::warn!(query = %query, error = %err, "Search failed, trying next template");
                    continue;
                }
            };

            if handles.is_empty() {
                tracing::debug!(query = %query, "No provisional results, trying next template");
                continue;
            }

            for handle in handles.iter().take(PROVISIONAL_RESULTS) {
                self.pacer.wait().await;

                match self.provider.probe(&handle.uri).await {
                    Ok(ProbeOutcome::Playable) => {
                        tracing::info!(
                            title = %candidate.title,
                            query = %query,
                            uri = %handle.uri,
                            "Validated playable source"
                        );
                        return Ok(SourceReference {
                            candidate_index,
                            locator_uri: handle.uri.clone(),
                            validated: true,
                        });
                    }
                    Ok(ProbeOutcome::NotPlayable) => {
                        tracing::debug!(uri = %handle.uri, "Probe rejected candidate");
                    }
                    Ok(ProbeOutcome::Blocked) | Err(Error::SourceBlocked) => {
                        tracing::warn!(uri = %handle.uri, "Source blocked during probe, aborting templates");
                        return Err(Error::SourceBlocked);
                    }
                    Err(err) => {
                        tracing::warn!(uri = %handle.uri, error = %err, "Probe failed, trying next result");
                    }
                }
            }

            tracing::debug!(query = %query, "Template abandoned, no candidate validated");
        }

        tracing::info!(title = %candidate.title, "No playable source after exhausting templates");
        Err(Error::NotFound(format!(
            "no playable source for '{}'",
            candidate.title
        )))
    }
}
