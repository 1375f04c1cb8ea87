//! End-to-end conversation tests
//!
//! Drives the orchestrator through full conversations against in-memory
//! providers and a recording reply sink, covering the state machine
//! transitions and the pipeline's failure behavior.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tunedrop_bot::acquire::AcquisitionEngine;
use tunedrop_bot::locator::SourceLocator;
use tunedrop_bot::orchestrator::{Orchestrator, ReplySink};
use tunedrop_bot::providers::{
    ArtistRef, MetadataProvider, ProbeOutcome, SourceHandle, SourceProvider, TrackCandidate,
};
use tunedrop_bot::resolver::TrackResolver;
use tunedrop_bot::session::{ConversationState, SessionStore};
use tunedrop_common::events::{ChatEvent, Reply};
use tunedrop_common::{Error, Result};

const USER: i64 = 100;

struct MockMetadata {
    artists: HashMap<String, Vec<TrackCandidate>>,
}

impl MockMetadata {
    fn with_artist(name: &str, track_count: usize) -> Self {
        let tracks = (1..=track_count)
            .map(|i| TrackCandidate {
                title: format!("Song {i}"),
                performers: vec![name.to_string()],
                catalog_ref: format!("catalog:{i}"),
            })
            .collect();
        let mut artists = HashMap::new();
        artists.insert(name.to_lowercase(), tracks);
        Self { artists }
    }

    fn empty() -> Self {
        Self {
            artists: HashMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for MockMetadata {
    async fn search_artist(&self, name: &str) -> Result<Option<ArtistRef>> {
        let key = name.to_lowercase();
        Ok(self.artists.contains_key(&key).then(|| ArtistRef {
            id: key,
            name: name.to_string(),
        }))
    }

    async fn top_tracks(&self, artist: &ArtistRef) -> Result<Vec<TrackCandidate>> {
        Ok(self.artists.get(&artist.id).cloned().unwrap_or_default())
    }
}

#[derive(Clone, Copy)]
enum FetchScript {
    /// Write this many bytes to the destination
    Write(usize),
    /// Fail every attempt with a transient network error
    FailNetwork,
}

struct MockSource {
    /// URIs containing any of these markers probe as not playable
    unplayable_markers: Vec<String>,
    /// Every probe reports the blocked signature
    blocked: bool,
    fetch_script: FetchScript,
    fetch_calls: AtomicU32,
}

impl MockSource {
    fn playable(fetch_script: FetchScript) -> Self {
        Self {
            unplayable_markers: Vec::new(),
            blocked: false,
            fetch_script,
            fetch_calls: AtomicU32::new(0),
        }
    }

    fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SourceProvider for MockSource {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SourceHandle>> {
        Ok(vec![SourceHandle {
            uri: format!("src:{query}"),
            title: None,
        }])
    }

    async fn probe(&self, uri: &str) -> Result<ProbeOutcome> {
        if self.blocked {
            return Ok(ProbeOutcome::Blocked);
        }
        if self.unplayable_markers.iter().any(|m| uri.contains(m)) {
            return Ok(ProbeOutcome::NotPlayable);
        }
        Ok(ProbeOutcome::Playable)
    }

    async fn fetch(&self, _uri: &str, dest: &Path) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.fetch_script {
            FetchScript::Write(bytes) => {
                std::fs::write(dest, vec![0u8; bytes])?;
                Ok(())
            }
            FetchScript::FailNetwork => Err(Error::Network("connection reset".into())),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    replies: Mutex<Vec<Reply>>,
}

impl RecordingSink {
    fn texts(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .filter_map(|reply| match reply {
                Reply::Text { body, .. } | Reply::Choice { body, .. } => Some(body.clone()),
                Reply::Audio { .. } => None,
            })
            .collect()
    }

    fn audio_deliveries(&self) -> Vec<(std::path::PathBuf, String, String)> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .filter_map(|reply| match reply {
                Reply::Audio {
                    path,
                    title,
                    performer,
                    ..
                } => Some((path.clone(), title.clone(), performer.clone())),
                _ => None,
            })
            .collect()
    }

    fn last_text(&self) -> String {
        self.texts().last().cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, reply: Reply) -> Result<()> {
        // Audio deliveries must reference a live file at send time.
        if let Reply::Audio { path, .. } = &reply {
            assert!(path.exists(), "audio artifact missing at delivery time");
        }
        self.replies.lock().unwrap().push(reply);
        Ok(())
    }
}

struct Harness {
    orchestrator: Orchestrator,
    sessions: SessionStore,
    source: Arc<MockSource>,
    temp: TempDir,
}

impl Harness {
    fn new(metadata: MockMetadata, source: MockSource, max_artifact_bytes: u64) -> Self {
        let temp = TempDir::new().unwrap();
        let sessions = SessionStore::new();
        let source = Arc::new(source);

        let orchestrator = Orchestrator::new(
            sessions.clone(),
            TrackResolver::new(Arc::new(metadata)),
            SourceLocator::with_pacing(
                Arc::clone(&source) as Arc<dyn SourceProvider>,
                Duration::ZERO,
            ),
            AcquisitionEngine::new(
                Arc::clone(&source) as Arc<dyn SourceProvider>,
                temp.path().to_path_buf(),
                max_artifact_bytes,
            )
            .unwrap(),
        );

        Self {
            orchestrator,
            sessions,
            source,
            temp,
        }
    }

    async fn send(&self, event: ChatEvent, sink: &RecordingSink) {
        self.orchestrator.handle(event, sink).await.unwrap();
    }

    /// Run /start → language → artist search to reach PresentingPlaylist.
    async fn present_playlist(&self, artist: &str, sink: &RecordingSink) {
        self.send(ChatEvent::command(USER, "/start"), sink).await;
        self.send(ChatEvent::callback(USER, "lang_en"), sink).await;
        self.send(ChatEvent::text(USER, artist), sink).await;
    }

    async fn state(&self) -> ConversationState {
        self.sessions.get_or_create(USER).await.lock().await.state
    }

    fn artifact_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.temp.path()).unwrap().next().is_none()
    }
}

#[tokio::test]
async fn full_conversation_delivers_selected_track() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 10),
        MockSource::playable(FetchScript::Write(1024)),
        1024 * 1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;

    // Playlist lists exactly 10 numbered entries in resolver order.
    let playlist = sink.last_text();
    for i in 1..=10 {
        assert!(playlist.contains(&format!("{i}. Song {i}\n")), "missing entry {i}");
    }
    assert_eq!(harness.state().await, ConversationState::PresentingPlaylist);

    // Selecting "3" acquires candidate index 2 (0-based).
    harness.send(ChatEvent::text(USER, "3"), &sink).await;

    let deliveries = sink.audio_deliveries();
    assert_eq!(deliveries.len(), 1);
    let (path, title, performer) = &deliveries[0];
    assert_eq!(title, "Song 3");
    assert_eq!(performer, "Nina Simone");
    // Deletion after delivery: the artifact is gone once handling finished.
    assert!(!path.exists());
    assert!(harness.artifact_dir_is_empty());

    // Playlist is re-displayed and the session stays re-entrant.
    assert!(sink.last_text().contains("Playlist for Nina Simone"));
    assert_eq!(harness.state().await, ConversationState::PresentingPlaylist);
}

#[tokio::test]
async fn unknown_artist_stays_awaiting_artist() {
    let harness = Harness::new(
        MockMetadata::empty(),
        MockSource::playable(FetchScript::Write(16)),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Zed Q9", &sink).await;

    assert!(sink.last_text().contains("couldn't find Zed Q9"));
    assert_eq!(harness.state().await, ConversationState::AwaitingArtist);
}

#[tokio::test]
async fn out_of_range_selection_keeps_playlist() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 10),
        MockSource::playable(FetchScript::Write(16)),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    harness.send(ChatEvent::text(USER, "11"), &sink).await;

    assert!(sink.last_text().contains("between 1 and 10"));
    assert!(sink.audio_deliveries().is_empty());
    assert_eq!(harness.source.fetch_calls(), 0);

    let session = harness.sessions.get_or_create(USER).await;
    let session = session.lock().await;
    assert_eq!(session.state, ConversationState::PresentingPlaylist);
    assert_eq!(session.candidates.len(), 10);
}

#[tokio::test]
async fn repeated_selection_acquires_independently() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 3),
        MockSource::playable(FetchScript::Write(64)),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    harness.send(ChatEvent::text(USER, "2"), &sink).await;
    harness.send(ChatEvent::text(USER, "2"), &sink).await;

    // No cached short-circuit: two selections, two fetches.
    assert_eq!(harness.source.fetch_calls(), 2);
    assert_eq!(sink.audio_deliveries().len(), 2);
    assert!(harness.artifact_dir_is_empty());
}

#[tokio::test]
async fn exhausted_fetch_retries_leave_no_artifact() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 2),
        MockSource::playable(FetchScript::FailNetwork),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    harness.send(ChatEvent::text(USER, "1"), &sink).await;

    assert_eq!(harness.source.fetch_calls(), 3);
    assert!(sink.audio_deliveries().is_empty());
    assert!(harness.artifact_dir_is_empty());
    assert!(sink.texts().iter().any(|t| t.contains("Network trouble")));
    assert_eq!(harness.state().await, ConversationState::PresentingPlaylist);
}

#[tokio::test]
async fn oversized_artifact_is_rejected_and_removed() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 1),
        MockSource::playable(FetchScript::Write(4096)),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    harness.send(ChatEvent::text(USER, "1"), &sink).await;

    assert!(sink.audio_deliveries().is_empty());
    assert!(harness.artifact_dir_is_empty());
    assert!(sink.texts().iter().any(|t| t.contains("delivery limit")));
    assert_eq!(harness.state().await, ConversationState::PresentingPlaylist);
}

#[tokio::test]
async fn unlocatable_tracks_are_skipped_from_playlist() {
    let source = MockSource {
        unplayable_markers: vec!["Song 2".into()],
        blocked: false,
        fetch_script: FetchScript::Write(16),
        fetch_calls: AtomicU32::new(0),
    };
    let harness = Harness::new(MockMetadata::with_artist("Nina Simone", 3), source, 1024);
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;

    assert!(sink
        .texts()
        .iter()
        .any(|t| t.contains("Couldn't find a playable version of Song 2")));

    let playlist = sink.last_text();
    assert!(playlist.contains("1. Song 1\n"));
    assert!(playlist.contains("2. Song 3\n"));
    assert!(!playlist.contains("Song 2\n"));

    let session = harness.sessions.get_or_create(USER).await;
    assert_eq!(session.lock().await.candidates.len(), 2);
}

#[tokio::test]
async fn blocked_source_aborts_playlist_build() {
    let source = MockSource {
        unplayable_markers: Vec::new(),
        blocked: true,
        fetch_script: FetchScript::Write(16),
        fetch_calls: AtomicU32::new(0),
    };
    let harness = Harness::new(MockMetadata::with_artist("Nina Simone", 5), source, 1024);
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;

    assert!(sink.texts().iter().any(|t| t.contains("rate-limiting")));
    assert_eq!(harness.state().await, ConversationState::AwaitingArtist);
}

#[tokio::test]
async fn new_artist_query_replaces_playlist() {
    let mut metadata = MockMetadata::with_artist("Nina Simone", 3);
    metadata.artists.insert(
        "miles davis".into(),
        (1..=2)
            .map(|i| TrackCandidate {
                title: format!("Tune {i}"),
                performers: vec!["Miles Davis".into()],
                catalog_ref: format!("catalog:md{i}"),
            })
            .collect(),
    );
    let harness = Harness::new(metadata, MockSource::playable(FetchScript::Write(16)), 1024);
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    // Non-numeric input while presenting is a new artist query.
    harness.send(ChatEvent::text(USER, "Miles Davis"), &sink).await;

    let session = harness.sessions.get_or_create(USER).await;
    let session = session.lock().await;
    assert_eq!(session.artist_query, "Miles Davis");
    assert_eq!(session.candidates.len(), 2);
    assert_eq!(session.state, ConversationState::PresentingPlaylist);
    assert!(sink.last_text().contains("Playlist for Miles Davis"));
}

#[tokio::test]
async fn cancel_discards_the_session() {
    let harness = Harness::new(
        MockMetadata::with_artist("Nina Simone", 3),
        MockSource::playable(FetchScript::Write(16)),
        1024,
    );
    let sink = RecordingSink::default();

    harness.present_playlist("Nina Simone", &sink).await;
    harness.send(ChatEvent::command(USER, "/cancel"), &sink).await;

    assert!(!harness.sessions.contains(USER).await);
    assert!(sink.last_text().contains("cancelled"));

    // A later message starts over from language selection.
    harness.send(ChatEvent::text(USER, "Nina Simone"), &sink).await;
    assert_eq!(harness.state().await, ConversationState::AwaitingLanguage);
    assert!(sink.last_text().contains("/start"));
}
