//! Conversation orchestrator
//!
//! The per-user state machine sequencing the resolver, locator, and
//! acquisition engine in response to inbound chat events. Every failure
//! resolves to a state transition and a user-visible message; nothing here
//! is fatal to the process.

use crate::acquire::AcquisitionEngine;
use crate::locator::SourceLocator;
use crate::providers::TrackCandidate;
use crate::resolver::TrackResolver;
use crate::session::{ConversationState, Language, Session, SessionStore};
use tunedrop_common::events::{ChatEvent, ChatEventKind, ChoiceOption, Reply, UserId};
use tunedrop_common::{Error, Result};

/// Delivery side of the chat transport, injected into the orchestrator.
/// Sends are awaited so progress notices arrive before the slow work they
/// announce, and audio delivery completes before the artifact is released.
#[async_trait::async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;
}

/// Inbound payloads are classified once here at the boundary; the state
/// machine matches these variants exhaustively instead of re-parsing text
/// inside each state handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// `/start` command
    Start,
    /// `/cancel` command
    Cancel,
    /// Language chosen from the inline keyboard
    Language(String),
    /// Whole-number message text
    Numeric(i64),
    /// Any other message text
    FreeText(String),
    /// Unrecognized command or callback payload
    Unknown(String),
}

impl UserInput {
    pub fn classify(event: &ChatEvent) -> Self {
        match event.kind {
            ChatEventKind::Command => {
                let name = event.payload.split_whitespace().next().unwrap_or("");
                match name {
                    "/start" => UserInput::Start,
                    "/cancel" => UserInput::Cancel,
                    other => UserInput::Unknown(other.to_string()),
                }
            }
            ChatEventKind::Callback => match event.payload.strip_prefix("lang_") {
                Some(code) => UserInput::Language(code.to_string()),
                None => UserInput::Unknown(event.payload.clone()),
            },
            ChatEventKind::Text => {
                let text = event.payload.trim();
                match text.parse::<i64>() {
                    Ok(n) => UserInput::Numeric(n),
                    Err(_) => UserInput::FreeText(text.to_string()),
                }
            }
        }
    }
}

pub struct Orchestrator {
    sessions: SessionStore,
    resolver: TrackResolver,
    locator: SourceLocator,
    engine: AcquisitionEngine,
}

impl Orchestrator {
    pub fn new(
        sessions: SessionStore,
        resolver: TrackResolver,
        locator: SourceLocator,
        engine: AcquisitionEngine,
    ) -> Self {
        Self {
            sessions,
            resolver,
            locator,
            engine,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound event to completion, emitting replies through
    /// `sink`. The session mutex serializes handling per user; events from
    /// distinct users proceed in parallel.
    pub async fn handle(&self, event: ChatEvent, sink: &dyn ReplySink) -> Result<()> {
        let user_id = event.user_id;
        let input = UserInput::classify(&event);
        tracing::debug!(user_id, input = ?input, "Dispatching inbound event");

        match input {
            UserInput::Cancel => {
                self.sessions.remove(user_id).await;
                sink.send(Reply::Text {
                    user_id,
                    body: "Operation cancelled. Type /start to begin again! 😊".into(),
                })
                .await
            }
            UserInput::Start => {
                let handle = self.sessions.get_or_create(user_id).await;
                let mut session = handle.lock().await;
                *session = Session::new();
                sink.send(Reply::Choice {
                    user_id,
                    body: "Hello! I'm your playlist bot. Which language would you like to use? 😊"
                        .into(),
                    options: vec![ChoiceOption {
                        label: "English".into(),
                        data: "lang_en".into(),
                    }],
                })
                .await
            }
            input => {
                let handle = self.sessions.get_or_create(user_id).await;
                let mut session = handle.lock().await;
                self.dispatch(user_id, &mut session, input, sink).await
            }
        }
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        session: &mut Session,
        input: UserInput,
        sink: &dyn ReplySink,
    ) -> Result<()> {
        match (session.state, input) {
            (ConversationState::AwaitingLanguage, UserInput::Language(code)) => {
                match Language::from_code(&code) {
                    Some(language) => {
                        session.language = language;
                        session.state = ConversationState::AwaitingArtist;
                        sink.send(Reply::Text {
                            user_id,
                            body: "Awesome! Now tell me the name of a singer and I'll build a playlist for you! 🌟".into(),
                        })
                        .await
                    }
                    None => {
                        sink.send(Reply::Text {
                            user_id,
                            body: "I don't speak that one yet. Please pick a language from the buttons above!".into(),
                        })
                        .await
                    }
                }
            }
            (ConversationState::AwaitingLanguage, _) => {
                sink.send(Reply::Text {
                    user_id,
                    body: "Type /start and pick a language to get going! 😊".into(),
                })
                .await
            }
            (ConversationState::AwaitingArtist, UserInput::FreeText(artist)) => {
                self.search_and_present(user_id, session, artist, sink).await
            }
            (ConversationState::AwaitingArtist, UserInput::Numeric(n)) => {
                // No playlist is on offer yet, so a bare number is an artist
                // name like any other.
                self.search_and_present(user_id, session, n.to_string(), sink)
                    .await
            }
            (ConversationState::PresentingPlaylist, UserInput::Numeric(n)) => {
                self.acquire_and_deliver(user_id, session, n, sink).await
            }
            (ConversationState::PresentingPlaylist, UserInput::FreeText(artist)) => {
                self.search_and_present(user_id, session, artist, sink).await
            }
            (_, UserInput::Language(_)) => {
                sink.send(Reply::Text {
                    user_id,
                    body: "Language is already set. Tell me a singer's name! 😊".into(),
                })
                .await
            }
            (_, UserInput::Unknown(what)) => {
                tracing::debug!(user_id, what = %what, "Unrecognized input");
                sink.send(Reply::Text {
                    user_id,
                    body: "I didn't understand that. Send a singer's name, a playlist number, or /cancel.".into(),
                })
                .await
            }
            // Classified earlier in handle().
            (_, UserInput::Start) | (_, UserInput::Cancel) => Ok(()),
        }
    }

    /// New artist query: resolve candidates, keep the ones with a locatable
    /// source, and present them as the numbered playlist. Located references
    /// are discarded; selection re-locates so acquisition always runs against
    /// a fresh validated source.
    async fn search_and_present(
        &self,
        user_id: UserId,
        session: &mut Session,
        artist: String,
        sink: &dyn ReplySink,
    ) -> Result<()> {
        sink.send(Reply::Text {
            user_id,
            body: format!("Searching for songs by {artist}... Please wait! ⏳"),
        })
        .await?;

        let candidates = match self.resolver.resolve(&artist).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(user_id, artist = %artist, error = %err, "Resolution failed");
                session.clear_playlist();
                return sink
                    .send(Reply::Text {
                        user_id,
                        body: search_failure_message(&err, &artist),
                    })
                    .await;
            }
        };

        if candidates.is_empty() {
            session.clear_playlist();
            return sink
                .send(Reply::Text {
                    user_id,
                    body: format!("Sorry, I couldn't find {artist}. Try another name! 😊"),
                })
                .await;
        }

        let mut playable = Vec::new();
        let mut blocked = false;

        for (index, candidate) in candidates.iter().enumerate() {
            match self.locator.locate(index, candidate).await {
                Ok(_) => playable.push(candidate.clone()),
                Err(Error::SourceBlocked) => {
                    tracing::warn!(user_id, "Source blocked while building playlist");
                    blocked = true;
                    sink.send(Reply::Text {
                        user_id,
                        body: "The media source is rate-limiting me, so I stopped searching early. 😮".into(),
                    })
                    .await?;
                    break;
                }
                Err(err) => {
                    tracing::debug!(title = %candidate.title, error = %err, "No source for candidate");
                    sink.send(Reply::Text {
                        user_id,
                        body: format!(
                            "Couldn't find a playable version of {}. Skipping it... 😊",
                            candidate.title
                        ),
                    })
                    .await?;
                }
            }
        }

        if playable.is_empty() {
            session.clear_playlist();
            let body = if blocked {
                "Please give me a few minutes before the next playlist! 😊".into()
            } else {
                "No playable songs found. Try another artist! 😊".to_string()
            };
            return sink.send(Reply::Text { user_id, body }).await;
        }

        session.replace_playlist(artist, playable);
        sink.send(Reply::Text {
            user_id,
            body: playlist_message(&session.artist_query, &session.candidates),
        })
        .await
    }

    /// Numeric selection: re-locate a fresh source for the chosen candidate,
    /// fetch it, deliver, release the artifact, and re-present the playlist.
    async fn acquire_and_deliver(
        &self,
        user_id: UserId,
        session: &mut Session,
        selection: i64,
        sink: &dyn ReplySink,
    ) -> Result<()> {
        let count = session.candidates.len();
        if selection < 1 || selection > count as i64 {
            let err = Error::InvalidSelection {
                given: selection,
                max: count,
            };
            tracing::debug!(user_id, %err, "Rejecting selection");
            return sink
                .send(Reply::Text {
                    user_id,
                    body: format!(
                        "Please choose a number between 1 and {count} from the playlist! 😊"
                    ),
                })
                .await;
        }

        let index = (selection - 1) as usize;
        let candidate = session.candidates[index].clone();

        sink.send(Reply::Text {
            user_id,
            body: format!("⬇️ Downloading {}... Please wait a moment! 😊", candidate.title),
        })
        .await?;

        let delivered = self
            .fetch_and_send(user_id, session, index, &candidate, sink)
            .await;

        if let Err(err) = delivered {
            sink.send(Reply::Text {
                user_id,
                body: delivery_failure_message(&err, &candidate.title),
            })
            .await?;
        }

        // Re-display the playlist either way; the session stays in
        // PresentingPlaylist with its candidates untouched.
        sink.send(Reply::Text {
            user_id,
            body: playlist_message(&session.artist_query, &session.candidates),
        })
        .await
    }

    async fn fetch_and_send(
        &self,
        user_id: UserId,
        session: &Session,
        index: usize,
        candidate: &TrackCandidate,
        sink: &dyn ReplySink,
    ) -> Result<()> {
        let source = self.locator.locate(index, candidate).await?;

        let name_hint = format!("{}_{}", session.artist_query, candidate.title);
        let artifact = self.engine.fetch(&source, &name_hint).await?;

        tracing::info!(
            user_id,
            title = %candidate.title,
            size_bytes = artifact.size_bytes(),
            "Delivering audio"
        );

        sink.send(Reply::Audio {
            user_id,
            path: artifact.path().to_path_buf(),
            title: candidate.title.clone(),
            performer: candidate.primary_performer().to_string(),
        })
        .await?;

        sink.send(Reply::Text {
            user_id,
            body: format!("{} downloaded! Enjoy the music! 😊❤️", candidate.title),
        })
        .await?;

        // Artifact drops here: deletion after delivery on every path.
        Ok(())
    }
}

fn playlist_message(artist: &str, candidates: &[TrackCandidate]) -> String {
    let mut text = format!("🎵 Playlist for {artist}:\n\n");
    for (i, candidate) in candidates.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, candidate.title));
    }
    text.push_str(
        "\nWhich song would you like? Type the number! Or send another singer's name for a new playlist! 🌟",
    );
    text
}

fn search_failure_message(err: &Error, artist: &str) -> String {
    match err {
        Error::Network(_) | Error::Timeout => {
            "Network trouble while searching. Please check back in a moment and try again! 😊".into()
        }
        Error::SourceBlocked => {
            "The catalog is rate-limiting me right now. Give it a few minutes! 😮".into()
        }
        _ => format!("Something went wrong while searching for {artist}. Let's try again! 😊"),
    }
}

fn delivery_failure_message(err: &Error, title: &str) -> String {
    match err {
        Error::TooLarge { size_bytes, limit_bytes } => format!(
            "Sorry, {title} is {:.1} MB, over my {} MB delivery limit. Try another song! 😊",
            *size_bytes as f64 / (1024.0 * 1024.0),
            limit_bytes / (1024 * 1024),
        ),
        Error::SourceBlocked => {
            "The media source is rate-limiting downloads. Give it a few minutes and try again! 😮".into()
        }
        Error::NotFound(_) => format!(
            "Sorry, I couldn't find a downloadable version of {title} anymore. Try another one! 😊"
        ),
        Error::Network(_) | Error::Timeout => format!(
            "Network trouble while downloading {title}. Let's try another song or retry in a bit! 😊"
        ),
        _ => format!("Error while downloading {title}. Let's try another song! 😊"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> TrackCandidate {
        TrackCandidate {
            title: title.into(),
            performers: vec!["Artist".into()],
            catalog_ref: "ref".into(),
        }
    }

    #[test]
    fn classify_commands() {
        assert_eq!(UserInput::classify(&ChatEvent::command(1, "/start")), UserInput::Start);
        assert_eq!(UserInput::classify(&ChatEvent::command(1, "/cancel")), UserInput::Cancel);
        assert_eq!(
            UserInput::classify(&ChatEvent::command(1, "/help")),
            UserInput::Unknown("/help".into())
        );
    }

    #[test]
    fn classify_callback_language() {
        assert_eq!(
            UserInput::classify(&ChatEvent::callback(1, "lang_en")),
            UserInput::Language("en".into())
        );
        assert_eq!(
            UserInput::classify(&ChatEvent::callback(1, "mystery")),
            UserInput::Unknown("mystery".into())
        );
    }

    #[test]
    fn classify_numeric_or_free_text() {
        assert_eq!(UserInput::classify(&ChatEvent::text(1, " 3 ")), UserInput::Numeric(3));
        assert_eq!(UserInput::classify(&ChatEvent::text(1, "-2")), UserInput::Numeric(-2));
        assert_eq!(
            UserInput::classify(&ChatEvent::text(1, "Nina Simone")),
            UserInput::FreeText("Nina Simone".into())
        );
        // "3 Doors Down" is an artist, not a selection.
        assert_eq!(
            UserInput::classify(&ChatEvent::text(1, "3 Doors Down")),
            UserInput::FreeText("3 Doors Down".into())
        );
    }

    #[test]
    fn playlist_message_numbers_in_resolver_order() {
        let tracks: Vec<TrackCandidate> = (1..=10).map(|i| track(&format!("Song {i}"))).collect();
        let text = playlist_message("Artist", &tracks);

        assert!(text.contains("1. Song 1\n"));
        assert!(text.contains("10. Song 10\n"));
        assert_eq!(text.matches(". Song").count(), 10);
    }

    #[test]
    fn too_large_message_reports_sizes() {
        let err = Error::TooLarge {
            size_bytes: 60 * 1024 * 1024,
            limit_bytes: 50 * 1024 * 1024,
        };
        let text = delivery_failure_message(&err, "Song");
        assert!(text.contains("60.0 MB"));
        assert!(text.contains("50 MB"));
    }
}
