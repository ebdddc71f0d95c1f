use thiserror::Error;

/// Failures surfaced by the playback core.
///
/// Every variant is contained to the guild that produced it. The presentation
/// layer turns them into user-facing messages; none of them should ever bring
/// down the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MusicError {
    /// The query could not be turned into a playable track.
    #[error("Could not resolve **{query}**: {reason}")]
    Resolution { query: String, reason: String },

    /// Joining the voice channel failed.
    #[error("Could not join the voice channel: {0}")]
    Connection(String),

    /// The requesting user is not in a voice channel.
    #[error("You need to be in a voice channel!")]
    NotInVoice,

    /// The command does not apply to the session's current state.
    #[error("{0}")]
    InvalidState(&'static str),

    /// Input rejected before it reached a session.
    #[error("{0}")]
    Validation(String),

    /// The queue already holds the configured maximum.
    #[error("The queue is full (maximum {0} tracks)")]
    QueueFull(usize),

    /// The audio transport failed to start or keep a stream.
    #[error("Playback failed: {0}")]
    Playback(String),
}

impl MusicError {
    pub fn resolution(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            query: query.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error should be shown only to the requesting user.
    pub fn is_ephemeral(&self) -> bool {
        matches!(
            self,
            Self::NotInVoice | Self::InvalidState(_) | Self::Validation(_)
        )
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            MusicError::resolution("lofi", "no results").to_string(),
            "Could not resolve **lofi**: no results"
        );
        assert_eq!(
            MusicError::QueueFull(3).to_string(),
            "The queue is full (maximum 3 tracks)"
        );
        assert!(MusicError::InvalidState("Nothing is playing right now.").is_ephemeral());
        assert!(!MusicError::Playback("boom".into()).is_ephemeral());
    }
}
