//! Chat commands exposed as both slash and prefix commands.

use super::tasks::collect_statuses;
use super::{BotError, Context, admin_check};
use crate::app::AppContext;
use crate::remote;
use dropkeeper_core::leaderboard::{drop_summary, leaderboard_text};
use dropkeeper_core::links::{LinkOutcome, link_player, unlink_player};
use dropkeeper_core::richtext::broadcast_command;
use dropkeeper_core::status::render_status;
use dropkeeper_core::PlayerLink;

/// Discord rejects messages longer than 2000 characters.
const MESSAGE_LIMIT: usize = 1990;

pub fn all() -> Vec<poise::Command<super::Data, BotError>> {
    vec![
        get_item_drops(),
        get_server_top_ten(),
        rcon(),
        broadcast(),
        link_player_command(),
        unlink_player_command(),
        server_status(),
        help(),
    ]
}

/// Cut `text` to fit in one chat message.
pub fn clip(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(MESSAGE_LIMIT - 1).collect();
    clipped.push('…');
    clipped
}

/// Show how many drops a player has collected.
#[poise::command(slash_command, prefix_command, rename = "getitemdrops")]
pub async fn get_item_drops(
    ctx: Context<'_>,
    #[description = "Player id as reported by the game"] user_id: String,
) -> Result<(), BotError> {
    let summary = ctx
        .data()
        .app
        .blocking(move |app| drop_summary(&app.drops, &user_id))
        .await?;
    ctx.say(summary).await?;
    Ok(())
}

fn server_names(app: &AppContext) -> String {
    app.config
        .servers
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Show the drop leaderboard for this server.
#[poise::command(slash_command, prefix_command, rename = "getservertopten")]
pub async fn get_server_top_ten(ctx: Context<'_>) -> Result<(), BotError> {
    let text = ctx
        .data()
        .app
        .blocking(|app| {
            let board = &app.config.leaderboard;
            leaderboard_text(&app.drops, &board.server_name, board.limit)
        })
        .await?;
    ctx.say(clip(&text)).await?;
    Ok(())
}

/// Run a remote console command on one server.
#[poise::command(slash_command, prefix_command, check = "admin_check")]
pub async fn rcon(
    ctx: Context<'_>,
    #[description = "Server number starting at 1, or server name"] server: String,
    #[description = "Command to run"]
    #[rest]
    command: String,
) -> Result<(), BotError> {
    let app = &ctx.data().app;
    let Some(client) = app.resolve_server(&server) else {
        return Err(BotError::Usage(format!(
            "Pick a server between 1 and {} or one of: {}",
            app.config.servers.len(),
            server_names(app)
        )));
    };

    ctx.defer().await?;
    let response = remote::run_command(&client, &command, &app.retry).await;
    ctx.say(clip(&response)).await?;
    Ok(())
}

/// Broadcast a message to every server. Supports {g}{r}{b}{y}{c}{p}{o} and {/}.
#[poise::command(slash_command, prefix_command, check = "admin_check")]
pub async fn broadcast(
    ctx: Context<'_>,
    #[description = "Message with optional color tags"]
    #[rest]
    message: String,
) -> Result<(), BotError> {
    let app = &ctx.data().app;
    let servers = app.servers();
    if servers.is_empty() {
        return Err(BotError::Usage("No servers are configured.".to_string()));
    }

    ctx.defer().await?;
    let command = broadcast_command(&message);
    let mut delivered = 0;
    let mut failures = Vec::new();
    for client in &servers {
        match remote::execute(client, &command, &app.retry).await {
            Ok(_) => delivered += 1,
            Err(e) => failures.push(format!("{}: {}", client.name(), e)),
        }
    }

    let mut reply = format!("Broadcast sent to {} of {} servers.", delivered, servers.len());
    for failure in failures {
        reply.push_str(&format!("\n{}", failure));
    }
    ctx.say(clip(&reply)).await?;
    Ok(())
}

/// Link a chat name to a player's Steam and EOS ids.
#[poise::command(slash_command, prefix_command, rename = "linkplayer", check = "admin_check")]
pub async fn link_player_command(
    ctx: Context<'_>,
    #[description = "Name shown in chat"] display_name: String,
    #[description = "Steam id"] steam_id: String,
    #[description = "EOS id"] eos_id: String,
) -> Result<(), BotError> {
    let link = PlayerLink {
        display_name,
        steam_id,
        eos_id,
    };
    let reply = match link_player(&ctx.data().app.links, &link)? {
        LinkOutcome::Created => format!("Linked {}.", link.display_name),
        LinkOutcome::Updated => format!("Updated link for {}.", link.display_name),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Remove a player link.
#[poise::command(slash_command, prefix_command, rename = "unlinkplayer", check = "admin_check")]
pub async fn unlink_player_command(
    ctx: Context<'_>,
    #[description = "Name shown in chat"] display_name: String,
) -> Result<(), BotError> {
    let reply = if unlink_player(&ctx.data().app.links, &display_name)? {
        format!("Removed link for {}.", display_name)
    } else {
        format!("No link found for {}.", display_name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show player counts on every server.
#[poise::command(slash_command, prefix_command, rename = "serverstatus")]
pub async fn server_status(ctx: Context<'_>) -> Result<(), BotError> {
    ctx.defer().await?;
    let app = &ctx.data().app;
    let statuses = collect_statuses(app).await;
    let text = render_status(&statuses, app.started_at, chrono::Utc::now());
    ctx.say(clip(&text)).await?;
    Ok(())
}

/// List all available commands.
#[poise::command(slash_command, prefix_command)]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to show help for"] command: Option<String>,
) -> Result<(), BotError> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration::default(),
    )
    .await?;
    Ok(())
}
