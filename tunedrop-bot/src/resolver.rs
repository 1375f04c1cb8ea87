//! Track candidate resolution
//!
//! Turns an artist name into an ordered list of track candidates via the
//! metadata provider. Zero matches is an empty list, not an error; the
//! caller persists results into the session.

use crate::providers::{MetadataProvider, TrackCandidate};
use std::sync::Arc;
use std::time::Duration;
use tunedrop_common::{Result, RetryPolicy};

/// Candidate list is bounded to the provider's top N tracks.
pub const MAX_CANDIDATES: usize = 10;

const PROVIDER_ATTEMPTS: u32 = 3;
const PROVIDER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Resolves an artist name into top-track candidates.
pub struct TrackResolver {
    provider: Arc<dyn MetadataProvider>,
    retry: RetryPolicy,
}

impl TrackResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::new(PROVIDER_ATTEMPTS, PROVIDER_RETRY_DELAY),
        }
    }

    /// Resolve `artist_name` to at most [`MAX_CANDIDATES`] candidates in
    /// provider relevance order.
    ///
    /// Transient provider failures are retried up to the policy bound;
    /// non-transient failures surface immediately. Ambiguous artist names
    /// resolve deterministically to the provider's first match.
    pub async fn resolve(&self, artist_name: &str) -> Result<Vec<TrackCandidate>> {
        let artist = self
            .retry
            .run("artist search", || self.provider.search_artist(artist_name))
            .await?;

        let Some(artist) = artist else {
            tracing::info!(artist = %artist_name, "No artist match");
            return Ok(Vec::new());
        };

        tracing::debug!(
            artist = %artist.name,
            artist_id = %artist.id,
            "Resolved artist, fetching top tracks"
        );

        let mut tracks = self
            .retry
            .run("top tracks", || self.provider.top_tracks(&artist))
            .await?;

        tracks.truncate(MAX_CANDIDATES);

        tracing::info!(
            artist = %artist.name,
            candidates = tracks.len(),
            "Track candidates resolved"
        );

        Ok(tracks)
    }
}
