use crate::db::ActivityKind;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

pub async fn handle(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                "Logged in as {} ({} guilds)",
                data_about_bot.user.name,
                ctx.cache.guilds().len()
            );
            update_presence(ctx);
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if is_new.unwrap_or(false) {
                info!("Joined guild {} ({})", guild.name, guild.id);
            }
            update_presence(ctx);
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            info!("Left guild {}", incomplete.id);
            update_presence(ctx);
        }
        serenity::FullEvent::Message { new_message } => {
            if new_message.author.bot {
                return Ok(());
            }
            // DMs carry no guild and are not tracked.
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };
            if let Err(e) = data.db.log_message(
                &guild_id.to_string(),
                &new_message.channel_id.to_string(),
                &new_message.author.id.to_string(),
                new_message.content.chars().count() as i64,
            ) {
                warn!("Failed to log message event: {}", e);
            }
        }
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            handle_voice_state(old.as_ref(), new, data);
        }
        _ => {}
    }
    Ok(())
}

fn handle_voice_state(
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
    data: &Data,
) {
    if new.member.as_ref().is_some_and(|m| m.user.bot) {
        return;
    }
    let Some(guild_id) = new.guild_id else {
        return;
    };
    let user_id = new.user_id;

    let before = old.and_then(|state| state.channel_id);
    let after = new.channel_id;
    let now = Utc::now();

    match (before, after) {
        // Joined a voice channel.
        (None, Some(channel_id)) => {
            data.voice
                .begin(user_id.get(), guild_id.get(), channel_id.get(), now);
            if let Err(e) = data.db.log_activity(
                &guild_id.to_string(),
                &user_id.to_string(),
                ActivityKind::VoiceJoin,
                Some(&channel_id.to_string()),
                0,
            ) {
                warn!("Failed to log voice join: {}", e);
            }
        }
        // Left voice entirely. A leave with no tracked join is skipped.
        (Some(channel_id), None) => {
            if let Some(closed) = data.voice.end(user_id.get(), now) {
                if let Err(e) = data.db.log_activity(
                    &guild_id.to_string(),
                    &user_id.to_string(),
                    ActivityKind::VoiceLeave,
                    Some(&channel_id.to_string()),
                    closed.seconds,
                ) {
                    warn!("Failed to log voice leave: {}", e);
                }
            }
        }
        // Channel moves and mute/deafen toggles are not recorded.
        _ => {}
    }
}

fn update_presence(ctx: &serenity::Context) {
    let guild_count = ctx.cache.guilds().len();
    ctx.set_activity(Some(serenity::ActivityData::watching(format!(
        "{} servers | /analytics",
        guild_count
    ))));
}
