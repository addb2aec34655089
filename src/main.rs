use poise::serenity_prelude as serenity;
use tally::commands::{analytics, general};
use tally::{config::Config, events, Data};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let db = tally::db::Database::new(&config)?;
    db.execute_init()?;

    let voice = tally::voice::VoiceTracker::new();

    // The dashboard runs alongside the gateway client in the same process,
    // sharing only the storage handle.
    {
        let config = config.clone();
        let db = db.clone();
        tokio::spawn(async move {
            if let Err(e) = tally::web::serve(config, db).await {
                error!("Dashboard server exited: {:#}", e);
            }
        });
    }

    tokio::spawn(tally::retention::start_retention_task(
        db.clone(),
        config.retention_days,
    ));

    let sampler_db = db.clone();
    let sampler_voice = voice.clone();
    let sample_interval = config.sample_interval;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                analytics::analytics(),
                general::help(),
                general::invite(),
            ],
            event_handler: |ctx, event, _framework, data| {
                Box::pin(events::handle(ctx, event, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("Bot is ready!");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let sampler = tally::sampler::AnalyticsSampler::new(
                    sampler_db,
                    sampler_voice,
                    ctx.http.clone(),
                    ctx.cache.clone(),
                    sample_interval,
                );
                tokio::spawn(sampler.run());

                Ok(Data { config, db, voice })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
