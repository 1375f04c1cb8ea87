//! Chat transport adapters
//!
//! The orchestrator never talks to a chat service directly; it consumes
//! inbound [`tunedrop_common::events::ChatEvent`]s and emits replies through
//! a [`ReplySink`]. This module owns the Telegram Bot API adapter and the
//! two delivery mechanisms (long-poll and webhook), which share the
//! update-handling path below.

pub mod long_poll;
pub mod telegram;
pub mod webhook;

use crate::orchestrator::Orchestrator;
use crate::transport::telegram::{event_from_update, TelegramApi, TelegramSink, Update};
use std::sync::Arc;
use tunedrop_common::events::Reply;

pub use crate::orchestrator::ReplySink;

/// Handle one update on its own task. Per-user ordering is preserved by the
/// session mutex; distinct users are fully parallel.
pub(crate) fn spawn_update_handling(
    update: Update,
    api: Arc<TelegramApi>,
    orchestrator: Arc<Orchestrator>,
) {
    tokio::spawn(async move {
        // Acknowledge button presses right away so the client stops its
        // spinner even if handling takes a while.
        if let Some(callback_id) = update.callback_query.as_ref().map(|cq| cq.id.clone()) {
            if let Err(err) = api.answer_callback(&callback_id).await {
                tracing::warn!(error = %err, "Failed to answer callback query");
            }
        }

        let Some(event) = event_from_update(&update) else {
            tracing::debug!(update_id = update.update_id, "Ignoring unsupported update");
            return;
        };

        let user_id = event.user_id;
        let sink = TelegramSink::new(api);

        if let Err(err) = orchestrator.handle(event, &sink).await {
            tracing::warn!(user_id, error = %err, "Event handling failed");
            let apology = Reply::Text {
                user_id,
                body: "Oops! Something went wrong. Let's try again! 😊".into(),
            };
            if let Err(err) = sink.send(apology).await {
                tracing::warn!(user_id, error = %err, "Could not deliver failure notice");
            }
        }
    });
}
