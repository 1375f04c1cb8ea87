//! Telegram Bot API client
//!
//! Thin HTTP adapter over the Bot API methods the service needs: update
//! retrieval, text and audio delivery, inline keyboards, callback
//! acknowledgement, and webhook registration.

use crate::orchestrator::ReplySink;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tunedrop_common::events::{ChatEvent, ChoiceOption, Reply, UserId};
use tunedrop_common::Result;

const API_BASE_URL: &str = "https://api.telegram.org";
const USER_AGENT: &str = "tunedrop/0.1.0";

/// Socket-level bound for ordinary calls. Long-poll and audio uploads get
/// their own wider bounds below.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Server-side hold on getUpdates; must stay under REQUEST_TIMEOUT.
pub const LONG_POLL_HOLD_SECS: u64 = 25;

/// Telegram client errors
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API rejected call: {0}")]
    ApiError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TelegramError> for tunedrop_common::Error {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::NetworkError(msg) => tunedrop_common::Error::Network(msg),
            TelegramError::Timeout => tunedrop_common::Error::Timeout,
            TelegramError::Io(err) => tunedrop_common::Error::Io(err),
            other => tunedrop_common::Error::Provider(other.to_string()),
        }
    }
}

fn transport_error(err: reqwest::Error) -> TelegramError {
    if err.is_timeout() {
        TelegramError::Timeout
    } else {
        TelegramError::NetworkError(err.to_string())
    }
}

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> std::result::Result<T, TelegramError> {
        if self.ok {
            self.result
                .ok_or_else(|| TelegramError::ParseError("ok response without result".into()))
        } else {
            Err(TelegramError::ApiError(
                self.description.unwrap_or_else(|| "unknown".into()),
            ))
        }
    }
}

/// Inbound update
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

/// Convert an update into a chat event for the orchestrator.
///
/// Commands are split from plain text here so the payload classification in
/// the orchestrator never re-inspects transport details. Bot-name suffixes
/// (`/start@SomeBot`) are stripped.
pub fn event_from_update(update: &Update) -> Option<ChatEvent> {
    if let Some(message) = &update.message {
        let text = message.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        return Some(if let Some(command) = text.strip_prefix('/') {
            let name = command.split_whitespace().next().unwrap_or("");
            let name = name.split('@').next().unwrap_or(name);
            ChatEvent::command(message.chat.id, format!("/{name}"))
        } else {
            ChatEvent::text(message.chat.id, text)
        });
    }

    if let Some(callback) = &update.callback_query {
        let data = callback.data.as_deref()?;
        let user_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .or_else(|| callback.from.as_ref().map(|u| u.id))?;
        return Some(ChatEvent::callback(user_id, data));
    }

    None
}

/// Telegram Bot API client
pub struct TelegramApi {
    http_client: reqwest::Client,
    upload_client: reqwest::Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> std::result::Result<Self, TelegramError> {
        Self::with_base_url(API_BASE_URL, token)
    }

    /// Point the client at a non-default API server (test doubles).
    pub fn with_base_url(
        base_url: &str,
        token: &str,
    ) -> std::result::Result<Self, TelegramError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::NetworkError(e.to_string()))?;

        let upload_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            upload_client,
            base_url: format!("{base_url}/bot{token}"),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, TelegramError> {
        let response = self
            .http_client
            .post(format!("{}/{method}", self.base_url))
            .json(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::ParseError(e.to_string()))?;

        envelope.into_result()
    }

    /// Fetch updates past `offset`, holding the request server-side for up
    /// to [`LONG_POLL_HOLD_SECS`].
    pub async fn get_updates(&self, offset: i64) -> std::result::Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": LONG_POLL_HOLD_SECS,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: UserId,
        text: &str,
    ) -> std::result::Result<(), TelegramError> {
        let _: Message = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    pub async fn send_choice(
        &self,
        chat_id: UserId,
        text: &str,
        options: &[ChoiceOption],
    ) -> std::result::Result<(), TelegramError> {
        let keyboard: Vec<Vec<serde_json::Value>> = options
            .iter()
            .map(|option| vec![json!({ "text": option.label, "callback_data": option.data })])
            .collect();

        let _: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_markup": { "inline_keyboard": keyboard },
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn send_audio(
        &self,
        chat_id: UserId,
        path: &Path,
        title: &str,
        performer: &str,
    ) -> std::result::Result<(), TelegramError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.m4a".into());

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", title.to_string())
            .text("performer", performer.to_string())
            .part(
                "audio",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .upload_client
            .post(format!("{}/sendAudio", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ApiResponse<Message> = response
            .json()
            .await
            .map_err(|e| TelegramError::ParseError(e.to_string()))?;
        envelope.into_result()?;
        Ok(())
    }

    pub async fn answer_callback(&self, callback_id: &str) -> std::result::Result<(), TelegramError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }

    pub async fn set_webhook(&self, url: &str) -> std::result::Result<(), TelegramError> {
        let _: bool = self.call("setWebhook", json!({ "url": url })).await?;
        tracing::info!(url = %url, "Webhook registered");
        Ok(())
    }

    pub async fn delete_webhook(&self) -> std::result::Result<(), TelegramError> {
        let _: bool = self.call("deleteWebhook", json!({})).await?;
        Ok(())
    }
}

/// Delivery adapter handed to the orchestrator.
pub struct TelegramSink {
    api: Arc<TelegramApi>,
}

impl TelegramSink {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, reply: Reply) -> Result<()> {
        match reply {
            Reply::Text { user_id, body } => {
                self.api.send_message(user_id, &body).await?;
            }
            Reply::Choice {
                user_id,
                body,
                options,
            } => {
                self.api.send_choice(user_id, &body, &options).await?;
            }
            Reply::Audio {
                user_id,
                path,
                title,
                performer,
            } => {
                self.api
                    .send_audio(user_id, &path, &title, &performer)
                    .await?;
            }
        }
        Ok(())
    }
}
