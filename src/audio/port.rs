//! Seams between a session and the voice transport.
//!
//! A [`PlaybackPort`] streams one source at a time over an open voice
//! connection. The transport reports back through two signals that carry just
//! enough identity for the session to decide whether they are still relevant:
//! [`CompletionSignal`] (tagged with the stream generation) and
//! [`ConnectionWatch`] (tagged with the connection id).

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tracing::debug;

use super::{session::GuildSession, track::Volume, ChannelKey, GuildKey};
use crate::error::MusicResult;

/// An open voice connection capable of streaming a single source.
#[async_trait]
pub trait PlaybackPort: Send + Sync {
    /// Starts streaming `stream_url`. `on_complete` must fire exactly once,
    /// either at natural end of stream or after [`PlaybackPort::stop`].
    async fn play(&self, stream_url: &str, volume: Volume, on_complete: CompletionSignal) -> MusicResult<()>;

    async fn stop(&self) -> MusicResult<()>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    async fn set_volume(&self, volume: Volume) -> MusicResult<()>;

    /// Whether the transport still has a stream playing or paused.
    async fn is_active(&self) -> bool;

    /// Moves the open connection to another channel of the same guild. The
    /// active stream keeps playing.
    async fn move_to(&self, channel: ChannelKey) -> MusicResult<()>;

    /// Leaves the voice channel. The port is unusable afterwards.
    async fn disconnect(&self) -> MusicResult<()>;
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Joins `channel` in `guild`. The transport must call
    /// [`ConnectionWatch::lost`] if the connection later drops on its own.
    async fn connect(
        &self,
        guild: GuildKey,
        channel: ChannelKey,
        watch: ConnectionWatch,
    ) -> MusicResult<Box<dyn PlaybackPort>>;
}

/// A port together with the id the session knows it by and the channel it
/// sits in.
pub struct Connection {
    pub(crate) id: u64,
    pub(crate) channel: ChannelKey,
    pub(crate) port: Box<dyn PlaybackPort>,
    pub(crate) lost: Arc<AtomicBool>,
}

impl Connection {
    /// Set once the transport has reported this connection dropped, even if
    /// the notice arrived before the session bound it.
    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

/// "Stream finished" notice for one specific `play` call.
///
/// Firing never touches session state directly: the notice is delivered as a
/// task that waits for the session lock, so it is safe to fire from any
/// transport callback, including one running while the session lock is held.
pub struct CompletionSignal {
    session: Weak<GuildSession>,
    generation: u64,
}

impl CompletionSignal {
    pub(crate) fn new(session: &Arc<GuildSession>, generation: u64) -> Self {
        Self {
            session: Arc::downgrade(session),
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delivers the notice. `error` carries a mid-stream failure, if any.
    pub fn fire(self, error: Option<String>) {
        let Some(session) = self.session.upgrade() else {
            debug!("Completion for generation {} outlived its session", self.generation);
            return;
        };
        let generation = self.generation;
        tokio::spawn(async move {
            session.on_track_finished(generation, error).await;
        });
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("generation", &self.generation)
            .finish()
    }
}

/// "Connection dropped" notice for one specific connection.
#[derive(Clone)]
pub struct ConnectionWatch {
    session: Weak<GuildSession>,
    connection_id: u64,
    lost: Arc<AtomicBool>,
}

impl ConnectionWatch {
    pub(crate) fn new(session: &Arc<GuildSession>, connection_id: u64, lost: Arc<AtomicBool>) -> Self {
        Self {
            session: Arc::downgrade(session),
            connection_id,
            lost,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn lost(&self) {
        self.lost.store(true, Ordering::Release);
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            session.on_connection_lost(connection_id).await;
        });
    }
}

impl std::fmt::Debug for ConnectionWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWatch")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

/// Recording transport used by the session, registry and controller tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::error::MusicError;
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    pub struct PortLog {
        pub plays: Vec<(String, f32)>,
        pub pending: Option<CompletionSignal>,
        pub stops: usize,
        pub paused: bool,
        pub volume: Option<f32>,
        pub disconnected: bool,
        pub fail_urls: Vec<String>,
        pub moves: Vec<ChannelKey>,
    }

    /// Cheap to clone; clones share the same log.
    #[derive(Clone, Default)]
    pub struct FakePort {
        pub log: Arc<Mutex<PortLog>>,
    }

    impl FakePort {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn played(&self) -> Vec<String> {
            self.log.lock().plays.iter().map(|(url, _)| url.clone()).collect()
        }

        pub fn last_volume(&self) -> Option<f32> {
            let log = self.log.lock();
            log.volume.or_else(|| log.plays.last().map(|(_, v)| *v))
        }

        pub fn fail_on(&self, url: &str) {
            self.log.lock().fail_urls.push(url.to_string());
        }

        /// Simulates the end of the active stream.
        pub fn finish(&self, error: Option<&str>) {
            let pending = self.log.lock().pending.take();
            if let Some(signal) = pending {
                signal.fire(error.map(str::to_string));
            }
        }

        /// Takes the active stream's signal without firing it.
        pub fn take_pending(&self) -> Option<CompletionSignal> {
            self.log.lock().pending.take()
        }

        pub fn is_disconnected(&self) -> bool {
            self.log.lock().disconnected
        }

        pub fn moves(&self) -> Vec<ChannelKey> {
            self.log.lock().moves.clone()
        }
    }

    #[async_trait]
    impl PlaybackPort for FakePort {
        async fn play(&self, stream_url: &str, volume: Volume, on_complete: CompletionSignal) -> MusicResult<()> {
            let mut log = self.log.lock();
            if log.fail_urls.iter().any(|u| u == stream_url) {
                return Err(MusicError::Playback(format!("cannot open {}", stream_url)));
            }
            assert!(log.pending.is_none(), "second concurrent stream on one port");
            log.plays.push((stream_url.to_string(), volume.fraction()));
            log.pending = Some(on_complete);
            log.paused = false;
            log.volume = None;
            Ok(())
        }

        async fn stop(&self) -> MusicResult<()> {
            let pending = {
                let mut log = self.log.lock();
                log.stops += 1;
                log.pending.take()
            };
            if let Some(signal) = pending {
                signal.fire(None);
            }
            Ok(())
        }

        async fn pause(&self) -> MusicResult<()> {
            self.log.lock().paused = true;
            Ok(())
        }

        async fn resume(&self) -> MusicResult<()> {
            self.log.lock().paused = false;
            Ok(())
        }

        async fn set_volume(&self, volume: Volume) -> MusicResult<()> {
            self.log.lock().volume = Some(volume.fraction());
            Ok(())
        }

        async fn is_active(&self) -> bool {
            self.log.lock().pending.is_some()
        }

        async fn move_to(&self, channel: ChannelKey) -> MusicResult<()> {
            self.log.lock().moves.push(channel);
            Ok(())
        }

        async fn disconnect(&self) -> MusicResult<()> {
            self.log.lock().disconnected = true;
            Ok(())
        }
    }

    /// Hands out `FakePort`s and remembers every watch it was given.
    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub ports: Arc<Mutex<Vec<FakePort>>>,
        pub watches: Arc<Mutex<Vec<ConnectionWatch>>>,
        pub refuse: bool,
    }

    impl FakeConnector {
        pub fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::default()
            }
        }

        pub fn port(&self, index: usize) -> FakePort {
            self.ports.lock()[index].clone()
        }

        pub fn connections(&self) -> usize {
            self.ports.lock().len()
        }
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn connect(
            &self,
            _guild: GuildKey,
            _channel: ChannelKey,
            watch: ConnectionWatch,
        ) -> MusicResult<Box<dyn PlaybackPort>> {
            if self.refuse {
                return Err(MusicError::Connection("missing permissions".into()));
            }
            let port = FakePort::new();
            self.ports.lock().push(port.clone());
            self.watches.lock().push(watch);
            Ok(Box::new(port))
        }
    }
}
