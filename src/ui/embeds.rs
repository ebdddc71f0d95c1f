use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::audio::{
    session::{NowPlaying, QueueSnapshot},
    track::{format_duration, Track, Volume},
};

/// Bot color palette
pub mod colors {
    use serenity::all::Colour;

    pub const PLAYING_GREEN: Colour = Colour::new(0x1DB954);
    pub const QUEUED_BLURPLE: Colour = Colour::new(0x5865F2);
    pub const ERROR_RED: Colour = Colour::new(0xED4245);
    pub const INFO_YELLOW: Colour = Colour::new(0xFEE75C);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Number of "up next" lines rendered before collapsing into "...and N more".
const QUEUE_LINES: usize = 10;

pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    track_embed("🎶 Now Playing", track).color(colors::PLAYING_GREEN)
}

/// Now-playing view that reflects pause and loop state.
pub fn now_playing_status_embed(now: &NowPlaying) -> CreateEmbed {
    let title = if now.paused { "⏸️ Paused" } else { "🎶 Now Playing" };
    let mut embed = track_embed(title, &now.track)
        .color(colors::PLAYING_GREEN)
        .field("Volume", format!("{}%", now.volume.percent()), true);
    if now.loop_current {
        embed = embed.field("Loop", "🔂 On", true);
    }
    embed
}

pub fn queued_embed(track: &Track, position: usize) -> CreateEmbed {
    track_embed("📋 Added to Queue", track)
        .color(colors::QUEUED_BLURPLE)
        .field("Position", position.to_string(), true)
}

pub fn queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    if snapshot.current.is_none() && snapshot.total == 0 {
        return CreateEmbed::new()
            .title("📋 Queue")
            .description("The queue is empty. Use `/play` to add songs!")
            .color(colors::INFO_YELLOW);
    }

    CreateEmbed::new()
        .title("📋 Queue")
        .description(queue_lines(snapshot).join("\n"))
        .color(colors::QUEUED_BLURPLE)
        .footer(CreateEmbedFooter::new(format!(
            "Volume: {}% • Loop: {} • {} queued ({})",
            snapshot.volume.percent(),
            if snapshot.loop_current { "on" } else { "off" },
            snapshot.total,
            format_duration(Some(snapshot.queued_duration)),
        )))
}

pub fn info_embed(title: &str, description: Option<&str>) -> CreateEmbed {
    let embed = CreateEmbed::new().title(title).color(colors::INFO_YELLOW);
    match description {
        Some(description) => embed.description(description),
        None => embed,
    }
}

pub fn volume_embed(volume: Volume) -> CreateEmbed {
    info_embed(
        &format!("{} Volume", volume_emoji(volume.percent())),
        Some(&format!("Set to **{}%**", volume.percent())),
    )
}

pub fn error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
}

fn track_embed(title: &str, track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(title)
        .description(format!("**[{}]({})**", track.title(), track.source_url()))
        .field("Duration", duration_field(track), true);

    if let Some(requester) = track.requested_by() {
        embed = embed.field("Requested by", requester, true);
    }
    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_field(track: &Track) -> String {
    if track.is_live() {
        "🔴 Live".to_string()
    } else {
        track.duration_label()
    }
}

/// Text body of the queue listing.
pub fn queue_lines(snapshot: &QueueSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(current) = &snapshot.current {
        let label = if snapshot.paused { "⏸️ **Paused:**" } else { "🎶 **Now Playing:**" };
        lines.push(format!("{} {}", label, current));
        lines.push(String::new());
    }

    if snapshot.upcoming.is_empty() {
        lines.push("*No more tracks in queue.*".to_string());
        return lines;
    }

    lines.push("**Up Next:**".to_string());
    for (i, track) in snapshot.upcoming.iter().take(QUEUE_LINES).enumerate() {
        lines.push(format!("`{}.` {}", i + 1, track));
    }
    let shown = snapshot.upcoming.len().min(QUEUE_LINES);
    if snapshot.total > shown {
        lines.push(format!("\n*...and {} more*", snapshot.total - shown));
    }

    lines
}

pub fn volume_emoji(percent: u8) -> &'static str {
    match percent {
        51.. => "🔊",
        21..=50 => "🔉",
        _ => "🔈",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn snapshot(current: Option<Track>, upcoming: Vec<Track>, total: usize) -> QueueSnapshot {
        QueueSnapshot {
            current,
            paused: false,
            upcoming,
            total,
            volume: Volume::default(),
            loop_current: false,
            queued_duration: Duration::ZERO,
        }
    }

    fn song(title: &str, secs: u64) -> Track {
        Track::new(title, "https://example.com", "stream://x").with_duration_secs(secs)
    }

    #[test]
    fn test_queue_lines_with_overflow() {
        let upcoming: Vec<Track> = (1..=10).map(|i| song(&format!("Song {i}"), 60)).collect();
        let lines = queue_lines(&snapshot(Some(song("Current", 0)), upcoming, 14));

        assert_eq!(lines[0], "🎶 **Now Playing:** Current [Live]");
        assert_eq!(lines[2], "**Up Next:**");
        assert_eq!(lines[3], "`1.` Song 1 [01:00]");
        assert_eq!(lines.last().unwrap(), "\n*...and 4 more*");
    }

    #[test]
    fn test_queue_lines_without_upcoming() {
        let lines = queue_lines(&snapshot(Some(song("Current", 90)), Vec::new(), 0));
        assert_eq!(
            lines,
            vec![
                "🎶 **Now Playing:** Current [01:30]".to_string(),
                String::new(),
                "*No more tracks in queue.*".to_string(),
            ]
        );
    }

    #[test]
    fn test_duration_field_marks_live_tracks() {
        assert_eq!(duration_field(&song("Radio", 0)), "🔴 Live");
        assert_eq!(duration_field(&song("Song", 245)), "04:05");
    }

    #[test]
    fn test_volume_emoji() {
        assert_eq!(volume_emoji(100), "🔊");
        assert_eq!(volume_emoji(51), "🔊");
        assert_eq!(volume_emoji(50), "🔉");
        assert_eq!(volume_emoji(20), "🔈");
    }
}
