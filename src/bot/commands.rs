use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot understands.
pub fn all() -> Vec<CreateCommand> {
    vec![
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        volume_command(),
        loop_command(),
    ]
}

/// Registers global commands (can take up to an hour to propagate)
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all()).await?;

    Ok(())
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song, or add it to the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume paused playback")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave voice")
}

// Queue and settings

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the song that is playing")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set the playback volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume from 1 to 100")
                .min_int_value(1)
                .max_int_value(100)
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Toggle repeating the current song")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_set_is_complete() {
        let names: Vec<String> = all()
            .iter()
            .map(|command| {
                serde_json::to_value(command).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(
            names,
            ["play", "skip", "pause", "resume", "stop", "queue", "nowplaying", "volume", "loop"]
        );
    }
}
