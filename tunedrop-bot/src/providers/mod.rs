//! Provider trait definitions and the types flowing through the pipeline
//!
//! The core pipeline sees external services only through these traits:
//! - [`MetadataProvider`]: the music-catalog lookup service (artist search,
//!   top tracks)
//! - [`SourceProvider`]: the media source service (search, playback probe,
//!   fetch)
//!
//! Adapters translate service-specific failure signatures into the common
//! error taxonomy here at the boundary; core logic never inspects provider
//! error text.

pub mod spotify;
pub mod ytdlp;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tunedrop_common::Result;

/// Resolved artist reference from the metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    /// Provider-assigned artist identifier
    pub id: String,
    /// Canonical artist name as the provider spells it
    pub name: String,
}

/// A track returned by the metadata provider, prior to having a playable
/// source located for it. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackCandidate {
    /// Track title
    pub title: String,
    /// Credited performers, in provider order
    pub performers: Vec<String>,
    /// Opaque catalog reference, informational only (not used for playback)
    pub catalog_ref: String,
}

impl TrackCandidate {
    /// Primary performer for query building and delivery metadata.
    pub fn primary_performer(&self) -> &str {
        self.performers.first().map(String::as_str).unwrap_or("")
    }
}

/// Provisional search result from the source provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHandle {
    /// Opaque locator usable for probe and fetch
    pub uri: String,
    /// Result title, when the provider reports one
    pub title: Option<String>,
}

/// An opaque, validated handle usable to fetch playable audio for a
/// candidate. Created by the locator, consumed by the acquisition engine,
/// never persisted beyond one request.
#[derive(Debug, Clone)]
pub struct SourceReference {
    /// Index of the candidate this source belongs to
    pub candidate_index: usize,
    /// Opaque locator for the acquisition engine
    pub locator_uri: String,
    /// True only after a playback-capability probe succeeded
    pub validated: bool,
}

/// Outcome of a zero-download playback-capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Source is currently playable
    Playable,
    /// Source exists but cannot be played back
    NotPlayable,
    /// Automated-traffic defenses triggered
    Blocked,
}

/// Music-catalog lookup service.
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search for an artist by name. Zero matches is `Ok(None)`, not an error.
    async fn search_artist(&self, name: &str) -> Result<Option<ArtistRef>>;

    /// Top tracks for an artist, ordered by provider relevance.
    async fn top_tracks(&self, artist: &ArtistRef) -> Result<Vec<TrackCandidate>>;
}

/// Media source locator/fetcher service.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Up to `limit` provisional results for a query, in provider order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHandle>>;

    /// Zero-download playback-capability probe.
    async fn probe(&self, uri: &str) -> Result<ProbeOutcome>;

    /// Download the referenced media to `dest`. On success the file exists at
    /// `dest`; any failure is reported through the common taxonomy.
    async fn fetch(&self, uri: &str, dest: &Path) -> Result<()>;
}
