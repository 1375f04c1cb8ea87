//! Ephemeral per-user conversation state
//!
//! Sessions live for the process lifetime only. The store is a keyed map
//! behind an `RwLock`; each entry carries its own `Mutex` so that handling
//! for one user is serialized while distinct users proceed in parallel.

use crate::providers::TrackCandidate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tunedrop_common::events::UserId;

/// Placeholder language selection. Single variant today; the state machine
/// still passes through the selection step so the conversation shape is
/// stable when more languages land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    English,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::English),
            _ => None,
        }
    }
}

/// Conversation states. `PresentingPlaylist` is re-entrant: numeric
/// selections and new artist queries both loop back to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    AwaitingLanguage,
    AwaitingArtist,
    PresentingPlaylist,
}

/// Per-user conversation state.
///
/// `candidates`, once populated for an artist query, is immutable context
/// for numeric selections; [`Session::replace_playlist`] swaps query and
/// candidates together so stale selections can never mix artists.
#[derive(Debug, Default)]
pub struct Session {
    pub language: Language,
    pub artist_query: String,
    pub candidates: Vec<TrackCandidate>,
    pub state: ConversationState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically install a new artist query and its candidate list.
    pub fn replace_playlist(&mut self, artist_query: String, candidates: Vec<TrackCandidate>) {
        self.artist_query = artist_query;
        self.candidates = candidates;
        self.state = ConversationState::PresentingPlaylist;
    }

    /// Drop any presented playlist and return to artist entry.
    pub fn clear_playlist(&mut self) {
        self.artist_query.clear();
        self.candidates.clear();
        self.state = ConversationState::AwaitingArtist;
    }
}

/// Concurrency-safe keyed session map, injected into the orchestrator.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<UserId, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for `user_id`, creating a default one on first
    /// access. The returned handle's mutex serializes handling per user.
    pub async fn get_or_create(&self, user_id: UserId) -> Arc<Mutex<Session>> {
        {
            let map = self.inner.read().await;
            if let Some(session) = map.get(&user_id) {
                return Arc::clone(session);
            }
        }

        let mut map = self.inner.write().await;
        Arc::clone(
            map.entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new()))),
        )
    }

    /// Discard the session for `user_id`. An in-flight operation holding the
    /// old handle finishes on its own schedule; its state updates land on an
    /// orphaned entry and are discarded with it.
    pub async fn remove(&self, user_id: UserId) {
        let mut map = self.inner.write().await;
        if map.remove(&user_id).is_some() {
            tracing::debug!(user_id, "Session discarded");
        }
    }

    pub async fn contains(&self, user_id: UserId) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_default_session_on_first_access() {
        let store = SessionStore::new();
        let session = store.get_or_create(1).await;
        let session = session.lock().await;

        assert_eq!(session.state, ConversationState::AwaitingLanguage);
        assert!(session.candidates.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn same_user_gets_same_session() {
        let store = SessionStore::new();

        {
            let session = store.get_or_create(1).await;
            session.lock().await.artist_query = "Nina Simone".into();
        }

        let session = store.get_or_create(1).await;
        assert_eq!(session.lock().await.artist_query, "Nina Simone");
    }

    #[tokio::test]
    async fn distinct_users_do_not_interfere() {
        let store = SessionStore::new();

        let a = store.get_or_create(1).await;
        let b = store.get_or_create(2).await;

        a.lock().await.artist_query = "A".into();
        b.lock().await.artist_query = "B".into();

        assert_eq!(store.get_or_create(1).await.lock().await.artist_query, "A");
        assert_eq!(store.get_or_create(2).await.lock().await.artist_query, "B");
    }

    #[tokio::test]
    async fn remove_discards_state() {
        let store = SessionStore::new();
        store.get_or_create(1).await;
        store.remove(1).await;

        assert!(!store.contains(1).await);

        // Next access starts fresh.
        let session = store.get_or_create(1).await;
        assert_eq!(session.lock().await.state, ConversationState::AwaitingLanguage);
    }

    #[test]
    fn replace_playlist_swaps_query_and_candidates_together() {
        let mut session = Session::new();
        session.replace_playlist(
            "Artist".into(),
            vec![TrackCandidate {
                title: "Song".into(),
                performers: vec!["Artist".into()],
                catalog_ref: "ref:1".into(),
            }],
        );

        assert_eq!(session.state, ConversationState::PresentingPlaylist);
        assert_eq!(session.candidates.len(), 1);

        session.clear_playlist();
        assert!(session.artist_query.is_empty());
        assert!(session.candidates.is_empty());
        assert_eq!(session.state, ConversationState::AwaitingArtist);
    }

    #[test]
    fn language_codes() {
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("xx"), None);
    }
}
