use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::application::{CommandDataOption, CommandInteraction},
    model::id::GuildId,
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{session::Enqueued, ChannelKey},
    bot::JukeboxBot,
    error::MusicError,
    ui::embeds,
};

/// An embed plus whether only the invoking user should see it.
pub struct Reply {
    pub embed: CreateEmbed,
    pub ephemeral: bool,
}

impl Reply {
    fn public(embed: CreateEmbed) -> Self {
        Self { embed, ephemeral: false }
    }

    fn error(error: &MusicError) -> Self {
        Self {
            embed: embeds::error_embed(&error.to_string()),
            ephemeral: error.is_ephemeral(),
        }
    }
}

/// Handles slash commands
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        let reply = Reply {
            embed: embeds::error_embed("Commands can only be used in a server."),
            ephemeral: true,
        };
        return respond(ctx, &command, reply).await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id).await;
    }

    let reply = match command.data.name.as_str() {
        "skip" => handle_skip(bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "stop" => handle_stop(bot, guild_id).await,
        "queue" => handle_queue(bot, guild_id).await,
        "nowplaying" => handle_nowplaying(bot, guild_id).await,
        "volume" => handle_volume(bot, guild_id, &command.data.options).await,
        "loop" => handle_loop(bot, guild_id).await,
        other => {
            warn!("Unknown command /{}", other);
            Reply {
                embed: embeds::error_embed("Unknown command."),
                ephemeral: true,
            }
        }
    };

    respond(ctx, &command, reply).await
}

/// `/play` resolves through yt-dlp, which can outlast the 3 second
/// interaction deadline, so the response is deferred first.
async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(query) = option_str(&command.data.options, "query") else {
        let reply = Reply::error(&MusicError::Validation("Please provide a song name or URL.".into()));
        return respond(ctx, command, reply).await;
    };

    command.defer(&ctx.http).await?;

    let channel = user_voice_channel(ctx, command, guild_id);
    let requester = requester_name(command);

    let embed = match bot.music.play(guild_id.get(), channel, query, &requester).await {
        Ok(Enqueued::NowPlaying(track)) => embeds::now_playing_embed(&track),
        Ok(Enqueued::Queued { track, position }) => embeds::queued_embed(&track, position),
        Err(e) => {
            info!("/play failed in guild {}: {}", guild_id, e);
            embeds::error_embed(&e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn handle_skip(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    match bot.music.skip(guild_id.get()).await {
        Ok(track) => Reply::public(embeds::info_embed(
            "⏭️ Skipped",
            Some(&format!("**{}**", track.title())),
        )),
        Err(e) => Reply::error(&e),
    }
}

async fn handle_pause(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    match bot.music.pause(guild_id.get()).await {
        Ok(()) => Reply::public(embeds::info_embed("⏸️ Paused", None)),
        Err(e) => Reply::error(&e),
    }
}

async fn handle_resume(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    match bot.music.resume(guild_id.get()).await {
        Ok(()) => Reply::public(embeds::info_embed("▶️ Resumed", None)),
        Err(e) => Reply::error(&e),
    }
}

async fn handle_stop(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    bot.music.stop(guild_id.get()).await;
    Reply::public(embeds::info_embed(
        "⏹️ Stopped",
        Some("Cleared the queue and left the voice channel."),
    ))
}

async fn handle_queue(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    let snapshot = bot.music.queue(guild_id.get(), None).await;
    Reply::public(embeds::queue_embed(&snapshot))
}

async fn handle_nowplaying(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    match bot.music.now_playing(guild_id.get()).await {
        Ok(now) => Reply::public(embeds::now_playing_status_embed(&now)),
        Err(e) => Reply::error(&e),
    }
}

async fn handle_volume(bot: &JukeboxBot, guild_id: GuildId, options: &[CommandDataOption]) -> Reply {
    let Some(level) = option_int(options, "level") else {
        return Reply::error(&MusicError::Validation("Please provide a volume from 1 to 100.".into()));
    };

    match bot.music.set_volume(guild_id.get(), level).await {
        Ok(volume) => Reply::public(embeds::volume_embed(volume)),
        Err(e) => Reply::error(&e),
    }
}

async fn handle_loop(bot: &JukeboxBot, guild_id: GuildId) -> Reply {
    let title = if bot.music.toggle_loop(guild_id.get()).await {
        "🔂 Loop enabled"
    } else {
        "➡️ Loop disabled"
    };
    Reply::public(embeds::info_embed(title, None))
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(reply.embed)
                    .ephemeral(reply.ephemeral),
            ),
        )
        .await?;
    Ok(())
}

/// Voice channel the invoking user currently sits in, from the gateway cache.
fn user_voice_channel(ctx: &Context, command: &CommandInteraction, guild_id: GuildId) -> Option<ChannelKey> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&command.user.id)
        .and_then(|state| state.channel_id)
        .map(|channel| channel.get())
}

fn requester_name(command: &CommandInteraction) -> String {
    command
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .unwrap_or_else(|| command.user.display_name().to_string())
}

fn option_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn option_int(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_replies_follow_error_visibility() {
        assert!(Reply::error(&MusicError::NotInVoice).ephemeral);
        assert!(Reply::error(&MusicError::InvalidState("Nothing is playing right now.")).ephemeral);
        assert!(!Reply::error(&MusicError::resolution("asdf", "no results found")).ephemeral);
        assert!(!Reply::error(&MusicError::Connection("timed out".into())).ephemeral);
    }
}
