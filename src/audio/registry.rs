use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    session::{GuildSession, SessionSettings},
    GuildKey,
};

/// Process-wide map of guild sessions.
///
/// Sessions are created on first access and live as long as the process;
/// an idle session is just an empty one.
pub struct SessionRegistry {
    sessions: DashMap<GuildKey, Arc<GuildSession>>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    /// Returns the guild's session, creating it atomically if needed.
    pub fn get_or_create(&self, guild: GuildKey) -> Arc<GuildSession> {
        self.sessions
            .entry(guild)
            .or_insert_with(|| {
                debug!("Creating session for guild {}", guild);
                Arc::new(GuildSession::new(guild, self.settings))
            })
            .clone()
    }

    pub fn get(&self, guild: GuildKey) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops every session: timers cancelled, generations invalidated,
    /// voice connections closed.
    pub async fn shutdown(&self) {
        if self.is_empty() {
            return;
        }
        info!("🛑 Stopping {} guild session(s)", self.len());
        // Collect first so no shard lock is held across an await.
        let sessions: Vec<Arc<GuildSession>> = self.sessions.iter().map(|entry| entry.value().clone()).collect();
        futures::future::join_all(sessions.iter().map(|session| session.stop())).await;
    }
}
