use crate::db::Database;
use crate::voice::VoiceTracker;
use chrono::{Duration as ChronoDuration, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

/// Newest messages fetched per channel per tick (Discord page cap).
const MESSAGE_SCAN_LIMIT: u8 = 100;
/// Only messages newer than this count towards a snapshot.
const MESSAGE_SCAN_WINDOW_SECS: i64 = 3600;

/// Periodic task writing one snapshot row per guild per tick.
pub struct AnalyticsSampler {
    db: Database,
    voice: VoiceTracker,
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    interval: Duration,
}

impl AnalyticsSampler {
    pub fn new(
        db: Database,
        voice: VoiceTracker,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            voice,
            http,
            cache,
            interval,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            let guilds = self.cache.guilds();
            debug!("Sampler: taking snapshots of {} guilds", guilds.len());
            for guild_id in guilds {
                // A failing guild (missing permissions, gateway hiccup)
                // skips that guild only.
                if let Err(e) = self.sample_guild(guild_id).await {
                    warn!("Sampler: skipping guild {}: {}", guild_id, e);
                }
            }
        }
    }

    async fn sample_guild(&self, guild_id: serenity::GuildId) -> anyhow::Result<()> {
        let member_count = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.member_count)
            .unwrap_or(0) as i64;

        let channels = guild_id.channels(&self.http).await?;
        let text_channels: Vec<serenity::ChannelId> = channels
            .values()
            .filter(|channel| channel.kind == serenity::ChannelType::Text)
            .map(|channel| channel.id)
            .collect();
        let channel_count = text_channels.len() as i64;

        let cutoff = (Utc::now() - ChronoDuration::seconds(MESSAGE_SCAN_WINDOW_SECS)).timestamp();
        let mut message_count: i64 = 0;
        for channel_id in text_channels {
            let builder = serenity::GetMessages::new().limit(MESSAGE_SCAN_LIMIT);
            match channel_id.messages(&self.http, builder).await {
                Ok(messages) => {
                    message_count += messages
                        .iter()
                        .filter(|m| !m.author.bot && m.timestamp.unix_timestamp() >= cutoff)
                        .count() as i64;
                }
                // Channels the bot cannot read history of are skipped.
                Err(e) => debug!("Sampler: cannot read channel {}: {}", channel_id, e),
            }
        }

        let voice_minutes = self.voice.active_minutes(guild_id.get(), Utc::now());

        let gid = guild_id.to_string();
        self.db
            .run_blocking(move |db| {
                db.log_snapshot(&gid, member_count, channel_count, message_count, voice_minutes)
            })
            .await?;
        Ok(())
    }
}
