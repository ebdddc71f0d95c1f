use std::{fmt, time::Duration};

use crate::error::{MusicError, MusicResult};

/// A resolved, playable item.
///
/// Built once by a resolver and then moved between the queue and the
/// "current" slot of a session; it is never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    source_url: String,
    stream_url: String,
    duration_secs: u64,
    thumbnail: Option<String>,
    requested_by: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            stream_url: stream_url.into(),
            duration_secs: 0,
            thumbnail: None,
            requested_by: None,
        }
    }

    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = Some(requester.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// `None` for live streams and tracks of unknown length.
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn is_live(&self) -> bool {
        self.duration_secs == 0
    }

    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }

    pub fn requested_by(&self) -> Option<&str> {
        self.requested_by.as_deref()
    }

    /// `MM:SS`, or `Live` when the length is unknown.
    pub fn duration_label(&self) -> String {
        format_duration(self.duration())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.title, self.duration_label())
    }
}

/// Formats a track length as `MM:SS` (minutes are not wrapped into hours).
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) if d.as_secs() > 0 => {
            let total = d.as_secs();
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => "Live".to_string(),
    }
}

/// Playback volume, always within `(0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub const MIN_PERCENT: i64 = 1;
    pub const MAX_PERCENT: i64 = 100;

    /// Validates a user supplied level in the 1-100 range.
    pub fn from_percent(level: i64) -> MusicResult<Self> {
        if !(Self::MIN_PERCENT..=Self::MAX_PERCENT).contains(&level) {
            return Err(MusicError::Validation(format!(
                "Volume must be between {} and {}, got {}.",
                Self::MIN_PERCENT,
                Self::MAX_PERCENT,
                level
            )));
        }
        Ok(Self(level as f32 / 100.0))
    }

    pub fn from_fraction(fraction: f32) -> MusicResult<Self> {
        if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
            return Err(MusicError::Validation(format!(
                "Volume fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        Ok(Self(fraction))
    }

    pub fn fraction(self) -> f32 {
        self.0
    }

    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round() as u8
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duration_label() {
        let track = Track::new("Song", "https://youtu.be/x", "https://cdn/x").with_duration_secs(245);
        assert_eq!(track.duration_label(), "04:05");
        assert_eq!(track.duration(), Some(Duration::from_secs(245)));

        let live = Track::new("Radio", "https://youtu.be/r", "https://cdn/r");
        assert!(live.is_live());
        assert_eq!(live.duration_label(), "Live");
        assert_eq!(format_duration(Some(Duration::from_secs(3725))), "62:05");
    }

    #[test]
    fn test_volume_bounds() {
        assert_eq!(Volume::from_percent(1).unwrap().fraction(), 0.01);
        assert_eq!(Volume::from_percent(100).unwrap().percent(), 100);
        assert!(matches!(Volume::from_percent(0), Err(MusicError::Validation(_))));
        assert!(matches!(Volume::from_percent(150), Err(MusicError::Validation(_))));
        assert!(Volume::from_fraction(0.0).is_err());
        assert!(Volume::from_fraction(1.5).is_err());
        assert_eq!(Volume::default().percent(), 50);
    }
}
