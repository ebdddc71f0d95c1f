//! Track resolution.
//!
//! A [`Resolver`] turns whatever the user typed (a URL or free-form search
//! terms) into a playable [`Track`]. Resolution is a network round trip and
//! is always performed outside any session lock.

pub mod ytdlp;

use async_trait::async_trait;

use crate::{audio::track::Track, error::MusicResult};

pub use ytdlp::YtDlpResolver;

/// Maps a query or URL to a track. Idempotent and side-effect free beyond
/// the remote lookup, so callers may retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, query: &str) -> MusicResult<Track>;
}
