//! Songbird implementation of the voice seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ChannelId, GuildId};
use songbird::{
    events::{
        context_data::DisconnectReason, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler,
        TrackEvent,
    },
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Songbird,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    port::{CompletionSignal, ConnectionWatch, PlaybackPort, VoiceConnector},
    track::Volume,
    ChannelKey, GuildKey,
};
use crate::error::{MusicError, MusicResult};

/// Joins voice channels through songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild: GuildKey,
        channel: ChannelKey,
        watch: ConnectionWatch,
    ) -> MusicResult<Box<dyn PlaybackPort>> {
        if guild == 0 || channel == 0 {
            return Err(MusicError::Connection("invalid guild or channel id".into()));
        }
        let guild_id = GuildId::new(guild);
        let channel_id = ChannelId::new(channel);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))?;

        let connected;
        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ Could not self-deafen in guild {}: {}", guild, e);
            }
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier { watch },
            );
            connected = handler.current_connection().is_some();
        }

        if !connected {
            // Dropped before the disconnect handler was in place.
            if let Err(e) = self.manager.remove(guild_id).await {
                debug!("Cleanup of dropped call in guild {} failed: {}", guild, e);
            }
            return Err(MusicError::Connection("the voice connection dropped while joining".into()));
        }

        Ok(Box::new(SongbirdPort {
            manager: self.manager.clone(),
            guild_id,
            call,
            http: self.http.clone(),
            current: Mutex::new(None),
        }))
    }
}

/// One joined call; streams a single track at a time.
pub struct SongbirdPort {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdPort {
    fn handle(&self) -> MusicResult<TrackHandle> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| MusicError::Playback("no active stream".into()))
    }
}

#[async_trait]
impl PlaybackPort for SongbirdPort {
    async fn play(&self, stream_url: &str, volume: Volume, on_complete: CompletionSignal) -> MusicResult<()> {
        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        if let Err(e) = handle.set_volume(volume.fraction()) {
            warn!("⚠️ Could not set volume in guild {}: {}", self.guild_id, e);
        }

        debug!("Streaming generation {} in guild {}", on_complete.generation(), self.guild_id);
        let notifier = CompletionNotifier::new(on_complete);
        let registered = handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .and_then(|_| handle.add_event(Event::Track(TrackEvent::Error), notifier.clone()));
        if let Err(e) = registered {
            // The track died before we could listen for it; report the end now.
            notifier.fire(Some(e.to_string()));
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.stop() {
                debug!("Stop on finished track in guild {}: {}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn pause(&self) -> MusicResult<()> {
        self.handle()?
            .pause()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn resume(&self) -> MusicResult<()> {
        self.handle()?
            .play()
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn set_volume(&self, volume: Volume) -> MusicResult<()> {
        self.handle()?
            .set_volume(volume.fraction())
            .map_err(|e| MusicError::Playback(e.to_string()))
    }

    async fn is_active(&self) -> bool {
        let Ok(handle) = self.handle() else {
            return false;
        };
        match handle.get_info().await {
            Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn move_to(&self, channel: ChannelKey) -> MusicResult<()> {
        if channel == 0 {
            return Err(MusicError::Connection("invalid channel id".into()));
        }
        // Joining another channel with an open call moves that call.
        self.manager
            .join(self.guild_id, ChannelId::new(channel))
            .await
            .map(|_| ())
            .map_err(|e| MusicError::Connection(e.to_string()))
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await?;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))
    }
}

/// Fires a [`CompletionSignal`] at most once, whichever track event comes first.
#[derive(Clone)]
struct CompletionNotifier {
    signal: Arc<Mutex<Option<CompletionSignal>>>,
}

impl CompletionNotifier {
    fn new(signal: CompletionSignal) -> Self {
        Self {
            signal: Arc::new(Mutex::new(Some(signal))),
        }
    }

    fn fire(&self, error: Option<String>) {
        let signal = self.signal.lock().take();
        if let Some(signal) = signal {
            signal.fire(error);
        }
    }
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };
        self.fire(error);
        Some(Event::Cancel)
    }
}

struct DisconnectNotifier {
    watch: ConnectionWatch,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::DriverDisconnect(data) = ctx else {
            return None;
        };
        match &data.reason {
            // Requested leaves and channel moves report no reason.
            None | Some(DisconnectReason::AttemptDiscarded) => {
                debug!("Requested disconnect for connection {}", self.watch.connection_id());
            }
            Some(reason) => {
                debug!("Driver disconnect for connection {}: {:?}", self.watch.connection_id(), reason);
                self.watch.lost();
            }
        }
        None
    }
}
