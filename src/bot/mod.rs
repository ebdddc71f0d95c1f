//! # Bot Module
//!
//! Discord gateway glue for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]: it registers the
//! slash commands once the gateway is ready and routes every command
//! interaction to [`handlers`], which talk to the
//! [`MusicController`](crate::audio::controller::MusicController). No playback
//! state lives here.

use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info};

pub mod commands;
pub mod handlers;

use crate::{audio::controller::MusicController, config::Config};

pub struct JukeboxBot {
    config: Arc<Config>,
    pub music: Arc<MusicController>,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, music: Arc<MusicController>) -> Self {
        Self { config, music }
    }

    /// Registers commands on the development guild if one is configured,
    /// globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        if let Some(guild_id) = self.config.guild_id {
            commands::register_guild_commands(ctx, GuildId::new(guild_id)).await?;
            info!("✅ Commands registered for guild {}", guild_id);
        } else {
            commands::register_global_commands(ctx).await?;
            info!("✅ Global commands registered");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }
    }

    /// Errors are logged and never propagate; Discord shows "This interaction
    /// failed" for anything left unanswered.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }
}
