use std::sync::Arc;
use tracing::{debug, info};

use super::{
    port::{Connection, VoiceConnector},
    registry::SessionRegistry,
    session::{Enqueued, GuildSession, NowPlaying, QueueSnapshot, SessionSettings},
    track::{Track, Volume},
    ChannelKey, GuildKey,
};
use crate::{
    error::{MusicError, MusicResult},
    sources::Resolver,
};

/// The command surface the chat layer talks to.
///
/// Every method is keyed by guild and returns plain domain values, so no
/// platform type crosses this boundary.
pub struct MusicController {
    registry: SessionRegistry,
    resolver: Arc<dyn Resolver>,
    connector: Arc<dyn VoiceConnector>,
    queue_page_size: usize,
}

impl MusicController {
    pub fn new(
        settings: SessionSettings,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn VoiceConnector>,
        queue_page_size: usize,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(settings),
            resolver,
            connector,
            queue_page_size,
        }
    }

    /// Resolves `query` and plays it, or queues it behind the current track.
    ///
    /// `voice_channel` is the requester's current channel; a bot already
    /// connected elsewhere in the guild follows the requester there. Resolution
    /// and the voice join both happen before the session is touched, so a
    /// failure of either leaves the session as it was.
    pub async fn play(
        &self,
        guild: GuildKey,
        voice_channel: Option<ChannelKey>,
        query: &str,
        requester: &str,
    ) -> MusicResult<Enqueued> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::Validation("Please provide a song name or URL.".into()));
        }
        let channel = voice_channel.ok_or(MusicError::NotInVoice)?;

        let session = self.registry.get_or_create(guild);
        let track = self.resolver.resolve(query).await?.with_requested_by(requester);

        let connection = match session.current_channel().await {
            Some(current) => {
                if current != channel {
                    session.move_to(channel).await?;
                }
                None
            }
            None => Some(session.connect(self.connector.as_ref(), channel).await?),
        };

        self.enqueue_or_rejoin(guild, &session, track, channel, connection).await
    }

    /// Enqueues, rejoining `channel` once if the idle timer closed the
    /// connection after the caller saw it open.
    async fn enqueue_or_rejoin(
        &self,
        guild: GuildKey,
        session: &Arc<GuildSession>,
        track: Track,
        channel: ChannelKey,
        connection: Option<Connection>,
    ) -> MusicResult<Enqueued> {
        let result = session.enqueue_or_play(track.clone(), connection).await;
        if matches!(result, Err(MusicError::InvalidState(_))) && !session.is_connected().await {
            debug!("Voice connection closed during play in guild {}, rejoining", guild);
            let connection = session.connect(self.connector.as_ref(), channel).await?;
            return session.enqueue_or_play(track, Some(connection)).await;
        }
        result
    }

    pub async fn skip(&self, guild: GuildKey) -> MusicResult<Track> {
        self.registry.get_or_create(guild).skip().await
    }

    pub async fn pause(&self, guild: GuildKey) -> MusicResult<()> {
        self.registry.get_or_create(guild).pause().await
    }

    pub async fn resume(&self, guild: GuildKey) -> MusicResult<()> {
        self.registry.get_or_create(guild).resume().await
    }

    pub async fn stop(&self, guild: GuildKey) {
        self.registry.get_or_create(guild).stop().await
    }

    /// Upcoming tracks, `limit` defaulting to the configured page size.
    pub async fn queue(&self, guild: GuildKey, limit: Option<usize>) -> QueueSnapshot {
        let limit = limit.unwrap_or(self.queue_page_size);
        self.registry.get_or_create(guild).peek_queue(limit).await
    }

    pub async fn now_playing(&self, guild: GuildKey) -> MusicResult<NowPlaying> {
        self.registry.get_or_create(guild).now_playing().await
    }

    /// Validates a 1-100 level before the session sees it.
    pub async fn set_volume(&self, guild: GuildKey, level: i64) -> MusicResult<Volume> {
        let volume = Volume::from_percent(level)?;
        self.registry.get_or_create(guild).set_volume(volume).await;
        Ok(volume)
    }

    pub async fn toggle_loop(&self, guild: GuildKey) -> bool {
        self.registry.get_or_create(guild).toggle_loop().await
    }

    pub async fn shutdown(&self) {
        info!("🛑 Shutting down music controller");
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{port::fake::FakeConnector, session::PlaybackState},
        sources::MockResolver,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn resolver_returning(title: &'static str) -> MockResolver {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(move |query| {
            Ok(Track::new(title, format!("https://example.com/{query}"), format!("stream://{title}")))
        });
        resolver
    }

    fn controller(resolver: MockResolver, connector: FakeConnector) -> MusicController {
        MusicController::new(
            SessionSettings::default(),
            Arc::new(resolver),
            Arc::new(connector),
            10,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_then_queue_uses_one_connection() {
        let connector = FakeConnector::default();
        let music = controller(resolver_returning("Song"), connector.clone());

        let first = music.play(1, Some(9), "song", "alice").await.unwrap();
        let Enqueued::NowPlaying(track) = first else {
            panic!("expected playback to start");
        };
        assert_eq!(track.requested_by(), Some("alice"));

        let second = music.play(1, Some(9), "  song  ", "bob").await.unwrap();
        assert!(matches!(second, Enqueued::Queued { position: 1, .. }));
        assert_eq!(connector.connections(), 1);
        assert_eq!(music.now_playing(1).await.unwrap().track.title(), "Song");
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_requires_voice_channel_and_query() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().never();
        let music = controller(resolver, FakeConnector::default());

        assert_eq!(music.play(1, None, "song", "alice").await, Err(MusicError::NotInVoice));
        assert!(matches!(
            music.play(1, Some(9), "   ", "alice").await,
            Err(MusicError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_failure_leaves_session_untouched() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|query| Err(MusicError::resolution(query, "no results found")));
        let connector = FakeConnector::default();
        let music = controller(resolver, connector.clone());

        let result = music.play(1, Some(9), "asdfgh", "alice").await;
        assert_eq!(result, Err(MusicError::resolution("asdfgh", "no results found")));
        assert_eq!(connector.connections(), 0);
        assert_eq!(
            music.registry.get(1).unwrap().playback_state().await,
            PlaybackState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_is_surfaced() {
        let music = controller(resolver_returning("Song"), FakeConnector::refusing());
        let result = music.play(1, Some(9), "song", "alice").await;
        assert!(matches!(result, Err(MusicError::Connection(_))));
        assert_eq!(music.queue(1, None).await.current, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_validation() {
        let music = controller(resolver_returning("Song"), FakeConnector::default());

        assert!(matches!(music.set_volume(1, 150).await, Err(MusicError::Validation(_))));
        assert!(matches!(music.set_volume(1, 0).await, Err(MusicError::Validation(_))));
        assert_eq!(music.queue(1, None).await.volume.percent(), 50);

        assert_eq!(music.set_volume(1, 75).await.unwrap().percent(), 75);
        assert_eq!(music.queue(1, None).await.volume.percent(), 75);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_play_rejoins() {
        let connector = FakeConnector::default();
        let music = controller(resolver_returning("Song"), connector.clone());

        music.play(1, Some(9), "song", "alice").await.unwrap();
        music.stop(1).await;
        assert!(connector.port(0).is_disconnected());

        let again = music.play(1, Some(9), "song", "alice").await.unwrap();
        assert!(matches!(again, Enqueued::NowPlaying(_)));
        assert_eq!(connector.connections(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_follows_requester_to_another_channel() {
        let connector = FakeConnector::default();
        let music = controller(resolver_returning("Song"), connector.clone());

        music.play(1, Some(9), "a", "alice").await.unwrap();
        let second = music.play(1, Some(55), "b", "bob").await.unwrap();
        assert!(matches!(second, Enqueued::Queued { position: 1, .. }));

        let port = connector.port(0);
        assert_eq!(connector.connections(), 1);
        assert_eq!(port.moves(), vec![55]);
        assert!(!port.is_disconnected());

        let session = music.registry.get(1).unwrap();
        assert_eq!(session.current_channel().await, Some(55));
        assert_eq!(music.queue(1, None).await.total, 1);

        music.play(1, Some(55), "c", "carol").await.unwrap();
        assert_eq!(port.moves(), vec![55]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoins_when_idle_timer_closed_connection() {
        let connector = FakeConnector::default();
        let music = controller(resolver_returning("Song"), connector.clone());

        music.play(1, Some(9), "a", "alice").await.unwrap();
        connector.port(0).finish(None);
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(connector.port(0).is_disconnected());

        // The caller saw an open connection, so it passes none.
        let session = music.registry.get(1).unwrap();
        let track = Track::new("Late", "https://example.com/late", "stream://late");
        let result = music.enqueue_or_rejoin(1, &session, track, 9, None).await.unwrap();

        assert!(matches!(result, Enqueued::NowPlaying(_)));
        assert_eq!(connector.connections(), 2);
        assert_eq!(connector.port(1).played(), vec!["stream://late"]);
        assert_eq!(session.playback_state().await, PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_uses_page_size_by_default() {
        let music = controller(resolver_returning("Song"), FakeConnector::default());
        for _ in 0..13 {
            music.play(1, Some(9), "song", "alice").await.unwrap();
        }
        let snapshot = music.queue(1, None).await;
        assert_eq!(snapshot.upcoming.len(), 10);
        assert_eq!(snapshot.total, 12);
        assert_eq!(music.queue(1, Some(3)).await.upcoming.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guilds_are_independent() {
        let music = controller(resolver_returning("Song"), FakeConnector::default());
        music.play(1, Some(9), "song", "alice").await.unwrap();
        assert!(music.toggle_loop(1).await);

        assert_eq!(music.skip(2).await, Err(MusicError::InvalidState("Nothing is playing right now.")));
        assert!(!music.queue(2, None).await.loop_current);
        assert!(music.queue(1, None).await.loop_current);
    }
}
