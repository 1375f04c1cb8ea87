//! Spotify Web API client (metadata provider adapter)
//!
//! Client-credentials flow with token expiry caching. Artist search and
//! top-track listing only; playback never touches this service.

use crate::providers::{ArtistRef, MetadataProvider, TrackCandidate};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tunedrop_common::Result;

const ACCOUNTS_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE_URL: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = "tunedrop/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Renew this long before the token's reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Rate limited")]
    RateLimited,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<SpotifyError> for tunedrop_common::Error {
    fn from(err: SpotifyError) -> Self {
        match err {
            SpotifyError::NetworkError(msg) => tunedrop_common::Error::Network(msg),
            SpotifyError::Timeout => tunedrop_common::Error::Timeout,
            other => tunedrop_common::Error::Provider(other.to_string()),
        }
    }
}

fn transport_error(err: reqwest::Error) -> SpotifyError {
    if err.is_timeout() {
        SpotifyError::Timeout
    } else {
        SpotifyError::NetworkError(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    artists: ArtistPage,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    items: Vec<ArtistItem>,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    tracks: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    artists: Vec<TrackArtist>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct TrackArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> std::result::Result<Self, SpotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    /// Current bearer token, renewing through the client-credentials flow
    /// when absent or near expiry.
    async fn bearer_token(&self) -> std::result::Result<String, SpotifyError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting Spotify access token");

        let response = self
            .http_client
            .post(ACCOUNTS_TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == 400 || status == 401 {
            return Err(SpotifyError::AuthFailed);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))?;

        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = token.access_token.clone();

        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at,
        });

        Ok(value)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<T, SpotifyError> {
        let token = self.bearer_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();

        if status == 401 {
            // Token revoked out from under the cache; drop it so the next
            // call renews.
            self.token.lock().await.take();
            return Err(SpotifyError::AuthFailed);
        }
        if status == 429 {
            return Err(SpotifyError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::ApiError(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyError::ParseError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MetadataProvider for SpotifyClient {
    async fn search_artist(&self, name: &str) -> Result<Option<ArtistRef>> {
        tracing::debug!(artist = %name, "Searching Spotify for artist");

        let query = format!("artist:{name}");
        let response: ArtistSearchResponse = self
            .get_json(
                &format!("{API_BASE_URL}/search"),
                &[("q", query.as_str()), ("type", "artist"), ("limit", "1")],
            )
            .await?;

        // Provider relevance order; first item is the deterministic pick.
        Ok(response
            .artists
            .items
            .into_iter()
            .next()
            .map(|item| ArtistRef {
                id: item.id,
                name: item.name,
            }))
    }

    async fn top_tracks(&self, artist: &ArtistRef) -> Result<Vec<TrackCandidate>> {
        tracing::debug!(artist = %artist.name, artist_id = %artist.id, "Fetching top tracks");

        let response: TopTracksResponse = self
            .get_json(
                &format!("{API_BASE_URL}/artists/{}/top-tracks", artist.id),
                &[("market", "US")],
            )
            .await?;

        let tracks = response
            .tracks
            .into_iter()
            .map(|track| TrackCandidate {
                title: track.name,
                performers: track.artists.into_iter().map(|a| a.name).collect(),
                catalog_ref: track.external_urls.spotify.unwrap_or_default(),
            })
            .collect();

        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = SpotifyClient::new("id".into(), "secret".into());
        assert!(client.is_ok());
    }

    #[test]
    fn error_mapping_preserves_transience() {
        use tunedrop_common::Error;

        let err: Error = SpotifyError::NetworkError("reset".into()).into();
        assert!(err.is_transient());

        let err: Error = SpotifyError::Timeout.into();
        assert!(err.is_transient());

        let err: Error = SpotifyError::RateLimited.into();
        assert!(!err.is_transient());

        let err: Error = SpotifyError::AuthFailed.into();
        assert!(!err.is_transient());
    }

    #[test]
    fn parses_search_response() {
        let json = r#"{"artists":{"items":[{"id":"abc","name":"Nina Simone","genres":["jazz"]}]}}"#;
        let response: ArtistSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.artists.items[0].id, "abc");
        assert_eq!(response.artists.items[0].name, "Nina Simone");
    }

    #[test]
    fn parses_top_tracks_response() {
        let json = r#"{"tracks":[
            {"name":"Feeling Good","artists":[{"name":"Nina Simone"}],"external_urls":{"spotify":"https://open.spotify.com/track/x"}},
            {"name":"Sinnerman","artists":[{"name":"Nina Simone"}],"external_urls":{}}
        ]}"#;
        let response: TopTracksResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.tracks.len(), 2);
        assert_eq!(response.tracks[0].name, "Feeling Good");
        assert!(response.tracks[1].external_urls.spotify.is_none());
    }
}
