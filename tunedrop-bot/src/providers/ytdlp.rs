//! yt-dlp subprocess adapter (source provider)
//!
//! Search, playback probing, and fetching are delegated to the `yt-dlp`
//! executable. The tool reports failures as free text on stderr, so this
//! adapter is the one place substring signatures are recognized and
//! translated into the structured taxonomy; nothing upstream ever sees
//! provider error text.

use crate::providers::{ProbeOutcome, SourceHandle, SourceProvider};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tunedrop_common::Result;

const DEFAULT_BINARY: &str = "yt-dlp";
const INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Audio selection passed to every invocation; the service's native
/// container is delivered as-is (no transcoding).
const FORMAT_SELECTOR: &str = "bestaudio/best";

/// Stderr signatures of the service's automated-traffic defenses.
const BLOCKED_SIGNATURES: &[&str] = &[
    "HTTP Error 429",
    "Too Many Requests",
    "Sign in to confirm",
    "rate-limited",
    "captcha",
];

/// Stderr signatures of a source that is gone rather than failing.
const UNAVAILABLE_SIGNATURES: &[&str] = &[
    "Video unavailable",
    "This video is not available",
    "Private video",
    "has been removed",
];

/// yt-dlp adapter errors
#[derive(Debug, Error)]
pub enum YtDlpError {
    #[error("yt-dlp could not be spawned: {0}")]
    Spawn(String),

    #[error("yt-dlp invocation timed out")]
    Timeout,

    #[error("Source blocked")]
    Blocked,

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Download failed: {0}")]
    Failed(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<YtDlpError> for tunedrop_common::Error {
    fn from(err: YtDlpError) -> Self {
        match err {
            YtDlpError::Blocked => tunedrop_common::Error::SourceBlocked,
            YtDlpError::Timeout => tunedrop_common::Error::Timeout,
            YtDlpError::Unavailable(what) => tunedrop_common::Error::NotFound(what),
            YtDlpError::Failed(msg) => tunedrop_common::Error::Network(msg),
            YtDlpError::Spawn(msg) => tunedrop_common::Error::Provider(msg),
            YtDlpError::ParseError(msg) => tunedrop_common::Error::Provider(msg),
        }
    }
}

/// Classify a failed invocation's stderr into the adapter taxonomy.
fn classify_stderr(stderr: &str) -> YtDlpError {
    if BLOCKED_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
        return YtDlpError::Blocked;
    }
    if UNAVAILABLE_SIGNATURES.iter().any(|sig| stderr.contains(sig)) {
        return YtDlpError::Unavailable(last_line(stderr));
    }
    YtDlpError::Failed(last_line(stderr))
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string()
}

/// One line of `--dump-json --flat-playlist` search output.
#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: Option<String>,
    url: Option<String>,
    title: Option<String>,
}

impl SearchEntry {
    fn into_handle(self) -> Option<SourceHandle> {
        let uri = match (self.url, self.id) {
            (Some(url), _) if !url.is_empty() => url,
            (_, Some(id)) if !id.is_empty() => {
                format!("https://www.youtube.com/watch?v={id}")
            }
            _ => return None,
        };
        Some(SourceHandle {
            uri,
            title: self.title,
        })
    }
}

/// Media source provider backed by the yt-dlp executable.
pub struct YtDlpProvider {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpProvider {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            timeout: INVOCATION_TIMEOUT,
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: INVOCATION_TIMEOUT,
        }
    }

    async fn run(&self, args: &[&str]) -> std::result::Result<std::process::Output, YtDlpError> {
        tracing::debug!(binary = %self.binary.display(), ?args, "Invoking yt-dlp");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| YtDlpError::Spawn(format!("{}: {e}", self.binary.display())))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(YtDlpError::Spawn(err.to_string())),
            Err(_) => Err(YtDlpError::Timeout),
        }
    }
}

impl Default for YtDlpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SourceProvider for YtDlpProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHandle>> {
        let target = format!("ytsearch{limit}:{query}");
        let output = self
            .run(&[
                "--quiet",
                "--no-warnings",
                "--flat-playlist",
                "--dump-json",
                &target,
            ])
            .await
            .map_err(tunedrop_common::Error::from)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let handles: Vec<SourceHandle> = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SearchEntry>(line) {
                Ok(entry) => entry.into_handle(),
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping unparseable search entry");
                    None
                }
            })
            .take(limit)
            .collect();

        tracing::debug!(query = %query, results = handles.len(), "Search complete");
        Ok(handles)
    }

    async fn probe(&self, uri: &str) -> Result<ProbeOutcome> {
        let output = self
            .run(&[
                "-f",
                FORMAT_SELECTOR,
                "--simulate",
                "--quiet",
                "--no-warnings",
                uri,
            ])
            .await
            .map_err(tunedrop_common::Error::from)?;

        if output.status.success() {
            return Ok(ProbeOutcome::Playable);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match classify_stderr(&stderr) {
            YtDlpError::Blocked => Ok(ProbeOutcome::Blocked),
            _ => Ok(ProbeOutcome::NotPlayable),
        }
    }

    async fn fetch(&self, uri: &str, dest: &Path) -> Result<()> {
        let dest_arg = dest.to_string_lossy();
        let output = self
            .run(&[
                "-f",
                FORMAT_SELECTOR,
                "-o",
                dest_arg.as_ref(),
                "--quiet",
                "--no-warnings",
                "--no-progress",
                "--socket-timeout",
                "30",
                uri,
            ])
            .await
            .map_err(tunedrop_common::Error::from)?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_stderr(&stderr).into())
    }
}
