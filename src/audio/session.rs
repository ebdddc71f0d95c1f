//! Per-guild playback session.
//!
//! A [`GuildSession`] owns the queue, the current track, the voice port and
//! the idle-disconnect timer of one guild. Every mutation goes through the
//! session's async mutex, including the completion notices that arrive from
//! the voice transport and the idle timer firing, so no operation can observe
//! a half-updated session.
//!
//! Two tags keep late asynchronous events from acting on a session that has
//! moved on:
//!
//! - the **generation**, bumped every time a stream is started and every time
//!   the session is reset; completion notices and idle timers carry the
//!   generation they were issued for and are dropped if it changed;
//! - the **connection id**, used the same way for "voice connection lost".

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    port::{CompletionSignal, Connection, ConnectionWatch, VoiceConnector},
    track::{Track, Volume},
    ChannelKey, GuildKey,
};
use crate::error::{MusicError, MusicResult};

const NOTHING_PLAYING: &str = "Nothing is playing right now.";
const NOTHING_PAUSED: &str = "Nothing is paused right now.";
const NOT_CONNECTED: &str = "I'm not connected to a voice channel.";

/// Knobs a session is created with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub default_volume: Volume,
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: Volume::default(),
            idle_timeout: Duration::from_secs(120),
            max_queue_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No voice connection.
    Idle,
    /// Connected, nothing current, queue empty, idle timer armed.
    ConnectedIdle,
    Playing,
    Paused,
}

/// Outcome of [`GuildSession::enqueue_or_play`].
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    NowPlaying(Track),
    /// `position` is 1-based.
    Queued { track: Track, position: usize },
}

/// Read-only view of the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub paused: bool,
    pub upcoming: Vec<Track>,
    pub total: usize,
    pub volume: Volume,
    pub loop_current: bool,
    /// Sum of the known lengths of queued tracks; live tracks count as zero.
    pub queued_duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: Track,
    pub paused: bool,
    pub loop_current: bool,
    pub volume: Volume,
}

struct SessionState {
    queue: VecDeque<Track>,
    current: Option<Track>,
    connection: Option<Connection>,
    volume: Volume,
    loop_current: bool,
    paused: bool,
    generation: u64,
    idle_timer: Option<CancellationToken>,
}

impl SessionState {
    fn new(volume: Volume) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            connection: None,
            volume,
            loop_current: false,
            paused: false,
            generation: 0,
            idle_timer: None,
        }
    }

    fn playback_state(&self) -> PlaybackState {
        match (&self.connection, &self.current) {
            (None, _) => PlaybackState::Idle,
            (Some(_), None) => PlaybackState::ConnectedIdle,
            (Some(_), Some(_)) if self.paused => PlaybackState::Paused,
            (Some(_), Some(_)) => PlaybackState::Playing,
        }
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.cancel();
        }
    }

    /// Back to the zero-value `Idle` state. The volume is a guild preference
    /// and survives. Returns the connection so the caller can tear it down.
    fn reset(&mut self) -> Option<Connection> {
        self.generation += 1;
        self.cancel_idle_timer();
        self.queue.clear();
        self.current = None;
        self.loop_current = false;
        self.paused = false;
        self.connection.take()
    }
}

pub struct GuildSession {
    guild: GuildKey,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    next_connection_id: AtomicU64,
}

impl GuildSession {
    pub fn new(guild: GuildKey, settings: SessionSettings) -> Self {
        Self {
            guild,
            settings,
            state: Mutex::new(SessionState::new(settings.default_volume)),
            next_connection_id: AtomicU64::new(0),
        }
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.state.lock().await.playback_state()
    }

    pub async fn is_connected(&self) -> bool {
        self.playback_state().await != PlaybackState::Idle
    }

    /// Channel of the bound voice connection, if any.
    pub async fn current_channel(&self) -> Option<ChannelKey> {
        self.state.lock().await.connection.as_ref().map(|c| c.channel)
    }

    /// Opens a voice connection for this session without binding it.
    ///
    /// Runs outside the session lock; the returned [`Connection`] is bound by
    /// the next [`GuildSession::enqueue_or_play`].
    pub async fn connect(
        self: &Arc<Self>,
        connector: &dyn VoiceConnector,
        channel: ChannelKey,
    ) -> MusicResult<Connection> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
        let lost = Arc::new(AtomicBool::new(false));
        let port = connector
            .connect(self.guild, channel, ConnectionWatch::new(self, id, lost.clone()))
            .await?;
        info!("🔊 Joined voice channel {} in guild {}", channel, self.guild);
        Ok(Connection { id, channel, port, lost })
    }

    /// Moves the bound connection to `channel`, keeping the current track and
    /// the queue. No-op when already there or not connected.
    pub async fn move_to(&self, channel: ChannelKey) -> MusicResult<()> {
        let mut state = self.state.lock().await;
        let Some(connection) = state.connection.as_mut() else {
            return Ok(());
        };
        if connection.channel == channel {
            return Ok(());
        }
        connection.port.move_to(channel).await?;
        info!(
            "🔀 Moved from voice channel {} to {} in guild {}",
            connection.channel, channel, self.guild
        );
        connection.channel = channel;
        Ok(())
    }

    /// Starts `track` right away if nothing is current, otherwise appends it.
    ///
    /// `connection` is only needed when the session is not connected yet; an
    /// extra one (lost race with another request) is dropped.
    pub async fn enqueue_or_play(
        self: &Arc<Self>,
        track: Track,
        connection: Option<Connection>,
    ) -> MusicResult<Enqueued> {
        let mut state = self.state.lock().await;

        if state.current.is_some() {
            if let Some(extra) = connection {
                debug!("Dropping redundant connection {} in guild {}", extra.id, self.guild);
            }
            if state.queue.len() >= self.settings.max_queue_size {
                return Err(MusicError::QueueFull(self.settings.max_queue_size));
            }
            state.queue.push_back(track.clone());
            let position = state.queue.len();
            info!("➕ Queued {} at position {} in guild {}", track.title(), position, self.guild);
            return Ok(Enqueued::Queued { track, position });
        }

        match (connection, state.connection.is_some()) {
            (Some(connection), false) if connection.is_lost() => {
                warn!("🔌 Connection {} dropped before use in guild {}", connection.id, self.guild);
                if let Err(e) = connection.port.disconnect().await {
                    debug!("Cleanup of dropped connection failed in guild {}: {}", self.guild, e);
                }
                return Err(MusicError::Connection("the voice connection dropped while joining".into()));
            }
            (Some(connection), false) => state.connection = Some(connection),
            (Some(extra), true) => {
                debug!("Dropping redundant connection {} in guild {}", extra.id, self.guild);
            }
            (None, true) => {}
            (None, false) => return Err(MusicError::InvalidState(NOT_CONNECTED)),
        }

        state.cancel_idle_timer();
        match self.start_stream(&mut state, track.clone()).await {
            Ok(()) => Ok(Enqueued::NowPlaying(track)),
            Err(e) => {
                error!("❌ Could not start {} in guild {}: {}", track.title(), self.guild, e);
                self.enter_idle(&mut state);
                Err(e)
            }
        }
    }

    /// Requests the active stream to stop. The queue advances when the
    /// resulting completion notice is handled, never here.
    pub async fn skip(&self) -> MusicResult<Track> {
        let state = self.state.lock().await;
        let (Some(current), Some(connection)) = (state.current.as_ref(), state.connection.as_ref()) else {
            return Err(MusicError::InvalidState(NOTHING_PLAYING));
        };
        connection.port.stop().await?;
        info!("⏭️ Skipped {} in guild {}", current.title(), self.guild);
        Ok(current.clone())
    }

    pub async fn pause(&self) -> MusicResult<()> {
        let mut state = self.state.lock().await;
        if state.playback_state() != PlaybackState::Playing {
            return Err(MusicError::InvalidState(NOTHING_PLAYING));
        }
        if let Some(connection) = state.connection.as_ref() {
            connection.port.pause().await?;
        }
        state.paused = true;
        info!("⏸️ Paused in guild {}", self.guild);
        Ok(())
    }

    pub async fn resume(&self) -> MusicResult<()> {
        let mut state = self.state.lock().await;
        if state.playback_state() != PlaybackState::Paused {
            return Err(MusicError::InvalidState(NOTHING_PAUSED));
        }
        if let Some(connection) = state.connection.as_ref() {
            connection.port.resume().await?;
        }
        state.paused = false;
        info!("▶️ Resumed in guild {}", self.guild);
        Ok(())
    }

    /// Stops the stream, clears everything and leaves the channel. Idempotent.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        // The reset bumps the generation first, so the completion notice the
        // stop below produces is discarded.
        let Some(connection) = state.reset() else {
            return;
        };
        if let Err(e) = connection.port.stop().await {
            warn!("⚠️ Failed to stop stream in guild {}: {}", self.guild, e);
        }
        if let Err(e) = connection.port.disconnect().await {
            warn!("⚠️ Failed to leave voice in guild {}: {}", self.guild, e);
        }
        info!("⏹️ Stopped and disconnected in guild {}", self.guild);
    }

    /// Persists `volume` for later tracks and applies it to the live stream.
    pub async fn set_volume(&self, volume: Volume) {
        let mut state = self.state.lock().await;
        state.volume = volume;
        if state.current.is_some() {
            if let Some(connection) = state.connection.as_ref() {
                if let Err(e) = connection.port.set_volume(volume).await {
                    warn!("⚠️ Could not apply volume live in guild {}: {}", self.guild, e);
                }
            }
        }
        info!("🔊 Volume set to {}% in guild {}", volume.percent(), self.guild);
    }

    /// Flips looping of the current track and returns the new value.
    pub async fn toggle_loop(&self) -> bool {
        let mut state = self.state.lock().await;
        state.loop_current = !state.loop_current;
        if state.loop_current {
            info!("🔂 Loop enabled in guild {}", self.guild);
        } else {
            info!("➡️ Loop disabled in guild {}", self.guild);
        }
        state.loop_current
    }

    pub async fn peek_queue(&self, limit: usize) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            current: state.current.clone(),
            paused: state.paused,
            upcoming: state.queue.iter().take(limit).cloned().collect(),
            total: state.queue.len(),
            volume: state.volume,
            loop_current: state.loop_current,
            queued_duration: state.queue.iter().filter_map(Track::duration).sum(),
        }
    }

    pub async fn now_playing(&self) -> MusicResult<NowPlaying> {
        let state = self.state.lock().await;
        match (&state.current, &state.connection) {
            (Some(track), Some(_)) => Ok(NowPlaying {
                track: track.clone(),
                paused: state.paused,
                loop_current: state.loop_current,
                volume: state.volume,
            }),
            _ => Err(MusicError::InvalidState(NOTHING_PLAYING)),
        }
    }

    /// Handles the completion notice of the stream started at `generation`.
    pub(crate) async fn on_track_finished(self: &Arc<Self>, generation: u64, error: Option<String>) {
        let mut state = self.state.lock().await;
        if generation != state.generation {
            debug!(
                "Discarding stale completion (generation {} != {}) in guild {}",
                generation, state.generation, self.guild
            );
            return;
        }

        if let Some(error) = error {
            warn!("⚠️ Stream ended with an error in guild {}: {}", self.guild, error);
        }

        if let Some(finished) = state.current.take() {
            if state.loop_current {
                debug!("🔂 Replaying {} in guild {}", finished.title(), self.guild);
                state.queue.push_front(finished);
            }
        }
        state.paused = false;

        self.advance(&mut state).await;
    }

    pub(crate) async fn on_connection_lost(&self, connection_id: u64) {
        let mut state = self.state.lock().await;
        match state.connection.as_ref() {
            Some(connection) if connection.id == connection_id => {}
            _ => {
                debug!("Ignoring loss of old connection {} in guild {}", connection_id, self.guild);
                return;
            }
        }

        if let Some(connection) = state.reset() {
            if let Err(e) = connection.port.disconnect().await {
                debug!("Cleanup after lost connection failed in guild {}: {}", self.guild, e);
            }
        }
        warn!("🔌 Voice connection lost in guild {}, session reset", self.guild);
    }

    async fn on_idle_timeout(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock().await;
        if generation != state.generation
            || state.playback_state() != PlaybackState::ConnectedIdle
            || !state.queue.is_empty()
        {
            debug!("Ignoring stale idle timer in guild {}", self.guild);
            return;
        }

        let streaming = match state.connection.as_ref() {
            Some(connection) => connection.port.is_active().await,
            None => false,
        };
        if streaming {
            debug!("Transport still streaming in guild {}, idle timer re-armed", self.guild);
            self.arm_idle_timer(&mut state);
            return;
        }

        if let Some(connection) = state.reset() {
            if let Err(e) = connection.port.disconnect().await {
                warn!("⚠️ Failed to leave voice in guild {}: {}", self.guild, e);
            }
        }
        info!(
            "👋 Auto-disconnected from guild {} after {}s of inactivity",
            self.guild,
            self.settings.idle_timeout.as_secs()
        );
    }

    /// Pops queued tracks until one starts; enters `ConnectedIdle` otherwise.
    async fn advance(self: &Arc<Self>, state: &mut SessionState) {
        while let Some(next) = state.queue.pop_front() {
            let title = next.title().to_string();
            match self.start_stream(state, next).await {
                Ok(()) => return,
                Err(e) => error!("❌ Could not start {} in guild {}: {}", title, self.guild, e),
            }
        }

        if state.connection.is_some() {
            info!("📭 Queue empty in guild {}", self.guild);
            self.enter_idle(state);
        }
    }

    async fn start_stream(self: &Arc<Self>, state: &mut SessionState, track: Track) -> MusicResult<()> {
        state.generation += 1;
        let signal = CompletionSignal::new(self, state.generation);
        let Some(connection) = state.connection.as_ref() else {
            return Err(MusicError::InvalidState(NOT_CONNECTED));
        };
        connection.port.play(track.stream_url(), state.volume, signal).await?;

        info!("🎵 Now playing {} in guild {}", track.title(), self.guild);
        state.current = Some(track);
        state.paused = false;
        Ok(())
    }

    fn enter_idle(self: &Arc<Self>, state: &mut SessionState) {
        state.current = None;
        state.paused = false;
        self.arm_idle_timer(state);
    }

    /// Arms the one-shot idle disconnect, superseding any earlier timer.
    fn arm_idle_timer(self: &Arc<Self>, state: &mut SessionState) {
        let token = CancellationToken::new();
        if let Some(previous) = state.idle_timer.replace(token.clone()) {
            previous.cancel();
        }

        let session = Arc::downgrade(self);
        let generation = state.generation;
        let timeout = self.settings.idle_timeout;
        let guild = self.guild;
        debug!("⏲️ Idle timer armed for guild {} ({}s)", guild, timeout.as_secs());

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Idle timer cancelled for guild {}", guild);
                }
                _ = tokio::time::sleep(timeout) => {
                    if let Some(session) = session.upgrade() {
                        session.on_idle_timeout(generation).await;
                    }
                }
            }
        });
    }
}
