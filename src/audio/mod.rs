//! # Audio Module
//!
//! Per-guild playback sessions for the bot.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - Owns the queue, the current track, volume and loop flag of one guild
//! - Advances the queue when the voice transport reports a finished stream
//! - Arms the idle-disconnect timer when the queue runs dry
//!
//! ### [`registry`] - Session Registry
//! - One session per guild, created on first use
//! - Stops every session on shutdown
//!
//! ### [`controller`] - Command Surface
//! - `play`, `skip`, `pause`, `resume`, `stop`, `queue`, `now_playing`,
//!   `set_volume`, `toggle_loop`
//! - Resolves tracks and joins voice outside of any session lock
//!
//! ### [`port`] / [`voice`] - Voice Transport
//! - [`port::PlaybackPort`] and [`port::VoiceConnector`] are the seams
//! - [`voice`] implements them on top of songbird
//!
//! ## Concurrency
//!
//! Sessions of different guilds never contend. Within a guild all mutations
//! are serialized by the session lock; completion notices from the audio
//! driver are delivered as tasks that take the same lock, tagged with the
//! stream generation they belong to so stale ones can be dropped.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn example(controller: Arc<guild_jukebox::audio::controller::MusicController>) -> anyhow::Result<()> {
//! let guild = 123456789;
//! let channel = Some(987654321);
//!
//! controller.play(guild, channel, "never gonna give you up", "alice").await?;
//! controller.pause(guild).await?;
//! controller.resume(guild).await?;
//! controller.skip(guild).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod port;
pub mod registry;
pub mod session;
pub mod track;
pub mod voice;

/// Opaque guild identifier.
pub type GuildKey = u64;

/// Opaque voice channel identifier.
pub type ChannelKey = u64;
