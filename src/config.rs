use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::{session::SessionSettings, track::Volume};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // register commands to one guild while developing

    // Sessions
    pub default_volume: f32,
    pub idle_timeout_secs: u64,
    pub max_queue_size: usize,
    pub queue_page_size: usize,

    // Resolver
    pub ytdlp_path: String,
    pub resolve_timeout_secs: u64,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN is not set. Copy .env.example to .env and fill in your bot token.")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: std::env::var("GUILD_ID")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .filter(|id| *id != 0),

            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            queue_page_size: env_or("QUEUE_PAGE_SIZE", defaults.queue_page_size)?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            resolve_timeout_secs: env_or("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks on values that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.default_volume <= 0.0 || self.default_volume > 1.0 {
            anyhow::bail!("Default volume must be in (0.0, 1.0], got: {}", self.default_volume);
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            default_volume: Volume::from_fraction(self.default_volume)?,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_queue_size: self.max_queue_size,
        })
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Summary for the startup log; never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Sessions: {}% default volume, {}s idle timeout, {} max queue, {} per page\n  \
            Resolver: {} ({}s timeout)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.idle_timeout_secs,
            self.max_queue_size,
            self.queue_page_size,
            self.ytdlp_path,
            self.resolve_timeout_secs,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            idle_timeout_secs: 120,
            max_queue_size: 1000,
            queue_page_size: 10,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        let settings = config.session_settings().unwrap();
        assert_eq!(settings, SessionSettings::default());
        assert_eq!(config.resolve_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config { default_volume: 0.0, ..Config::default() },
            Config { default_volume: 1.5, ..Config::default() },
            Config { idle_timeout_secs: 0, ..Config::default() },
            Config { max_queue_size: 0, ..Config::default() },
            Config { queue_page_size: 0, ..Config::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "secret-token".into(),
            application_id: 42,
            guild_id: Some(7),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("App ID 42 (Guild: 7)"));
        assert!(summary.contains("50% default volume"));
    }
}
