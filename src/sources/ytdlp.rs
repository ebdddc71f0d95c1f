use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::Resolver;
use crate::{
    audio::track::Track,
    error::{MusicError, MusicResult},
};

/// Resolves queries by shelling out to `yt-dlp`.
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    // Keeps a burst of /play commands from spawning unbounded yt-dlp processes.
    rate_limiter: Semaphore,
}

/// The subset of yt-dlp's JSON we care about. Search results wrap the
/// actual video in `entries`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    pub fn is_url(query: &str) -> bool {
        Url::parse(query)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// URLs are passed through; anything else becomes a single-result search.
    fn target(query: &str) -> String {
        if Self::is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    async fn run(&self, query: &str) -> MusicResult<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::resolution(query, e.to_string()))?;

        let target = Self::target(query);
        debug!("Running {} for {}", self.binary, target);

        let mut command = Command::new(&self.binary);
        command
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                target.as_str(),
            ])
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MusicError::resolution(query, format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| MusicError::resolution(query, format!("could not run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp failed for {}: {}", query, stderr.trim());
            return Err(MusicError::resolution(query, "the source refused the request"));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn parse(query: &str, json: &str) -> MusicResult<Track> {
        let info: YtDlpInfo = serde_json::from_str(json)
            .map_err(|e| MusicError::resolution(query, format!("unreadable yt-dlp output: {}", e)))?;

        let info = match info.entries {
            Some(entries) => entries
                .into_iter()
                .next()
                .ok_or_else(|| MusicError::resolution(query, "no results found"))?,
            None => info,
        };

        let stream_url = info
            .url
            .ok_or_else(|| MusicError::resolution(query, "no playable audio stream"))?;
        let source_url = info
            .webpage_url
            .or(info.original_url)
            .unwrap_or_else(|| query.to_string());
        let title = info.title.unwrap_or_else(|| source_url.clone());

        let mut track = Track::new(title, source_url, stream_url)
            .with_duration_secs(info.duration.map(|d| d.max(0.0) as u64).unwrap_or(0));
        if let Some(thumbnail) = info.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        Ok(track)
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> MusicResult<Track> {
        info!("🔍 Resolving: {}", query);
        let json = self.run(query).await?;
        let track = Self::parse(query, &json)?;
        info!("✅ Resolved {} ({})", track.title(), track.duration_label());
        Ok(track)
    }
}
