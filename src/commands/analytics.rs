use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Days of history summarized in the reply.
const WINDOW_DAYS: u32 = 7;
const EMBED_COLOR: u32 = 0x5865F2;

/// Display server analytics and statistics
#[poise::command(slash_command, guild_only)]
pub async fn analytics(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    ctx.defer().await?;

    let gid = guild_id.to_string();
    let snapshots = ctx
        .data()
        .db
        .run_blocking({
            let gid = gid.clone();
            move |db| db.get_snapshots(&gid, WINDOW_DAYS)
        })
        .await?;
    let rollup = ctx
        .data()
        .db
        .run_blocking(move |db| db.get_message_rollup(&gid, WINDOW_DAYS))
        .await?;

    if snapshots.is_empty() {
        ctx.say("📊 No analytics data available yet. Please wait for data to be collected.")
            .await?;
        return Ok(());
    }

    let latest = &snapshots[0];
    let total_messages: i64 = snapshots.iter().map(|s| s.message_count).sum();
    let total_voice_minutes: i64 = snapshots.iter().map(|s| s.voice_minutes).sum();

    // Resolve names from the cache before building the reply.
    let guild_name = ctx.guild().map(|g| g.name.clone()).unwrap_or_default();
    let top_channel = rollup.first().map(|top| {
        let name = top
            .channel_id
            .parse::<u64>()
            .ok()
            .and_then(|id| {
                ctx.guild().and_then(|guild| {
                    guild
                        .channels
                        .get(&serenity::ChannelId::new(id))
                        .map(|channel| channel.name.clone())
                })
            })
            .unwrap_or_else(|| "unknown".to_string());
        format!("#{} ({} messages)", name, top.message_count)
    });

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📊 Server Analytics - {}", guild_name))
        .description(format!("Analytics for the last {} days", WINDOW_DAYS))
        .field("📈 Members", latest.member_count.to_string(), true)
        .field("📝 Channels", latest.channel_count.to_string(), true)
        .field("💬 Messages", total_messages.to_string(), true)
        .field("🎙️ Voice Minutes", total_voice_minutes.to_string(), true)
        .field("📅 Data Points", snapshots.len().to_string(), true)
        .color(EMBED_COLOR)
        .footer(serenity::CreateEmbedFooter::new("Use /help for more commands"))
        .timestamp(serenity::Timestamp::now());

    if let Some(top) = top_channel {
        embed = embed.field("🔥 Most Active Channel", top, false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}
