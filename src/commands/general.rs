use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Show help information about the bot
#[poise::command(slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let embed = serenity::CreateEmbed::new()
        .title("🤖 Tally - Help")
        .description("Discord server analytics bot")
        .field("/analytics", "View server analytics and statistics", false)
        .field("/help", "Show this help message", false)
        .field("/invite", "Get the bot invite link", false)
        .field(
            "🌐 Web Dashboard",
            "Visit the web dashboard for detailed analytics and charts",
            false,
        )
        .color(0x57F287);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Get the bot invite link
#[poise::command(slash_command)]
pub async fn invite(ctx: Context<'_>) -> Result<(), Error> {
    let Some(client_id) = ctx.data().config.client_id.clone() else {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Bot client ID not configured.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    let permissions = serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::READ_MESSAGE_HISTORY
        | serenity::Permissions::CONNECT
        | serenity::Permissions::SPEAK;

    let invite_url = format!(
        "https://discord.com/api/oauth2/authorize?client_id={}&permissions={}&scope=bot%20applications.commands",
        client_id,
        permissions.bits()
    );

    let embed = serenity::CreateEmbed::new()
        .title("🔗 Invite Tally")
        .description(format!(
            "[Click here to add the bot to your server]({})",
            invite_url
        ))
        .color(0x5865F2);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
