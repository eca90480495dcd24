//! Chat bot: command framework, error handling and admin gate.

pub mod commands;
pub mod tasks;

use crate::app::AppContext;
use dropkeeper_core::DropkeeperError;
use dropkeeper_core::permissions::roles_satisfy;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Shared data accessible across all commands.
pub struct Data {
    pub app: Arc<AppContext>,
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Discord API error: {0}")]
    Discord(#[from] Box<serenity::Error>),

    #[error(transparent)]
    Core(#[from] DropkeeperError),

    #[error("Permission denied: {0}")]
    Denied(String),

    #[error("{0}")]
    Usage(String),
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord(Box::new(err))
    }
}

impl BotError {
    pub fn user_message(&self) -> String {
        match self {
            BotError::Discord(_) => "Failed to communicate with Discord. Please try again.".to_string(),
            BotError::Core(DropkeeperError::Validation(msg)) => msg.clone(),
            BotError::Core(_) => "Something went wrong on our side. Please try again later.".to_string(),
            BotError::Denied(msg) | BotError::Usage(msg) => msg.clone(),
        }
    }
}

pub type Context<'a> = poise::Context<'a, Data, BotError>;

/// Gate for administrative commands: the caller needs one of the configured
/// admin roles. Open when none are configured.
pub async fn admin_check(ctx: Context<'_>) -> Result<bool, BotError> {
    let required = &ctx.data().app.config.discord.admin_roles;
    if required.is_empty() {
        return Ok(true);
    }

    let Some(member) = ctx.author_member().await else {
        return Err(BotError::Denied("This command only works inside a server.".to_string()));
    };
    let held: Vec<String> = match ctx.guild() {
        Some(guild) => member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id))
            .map(|role| role.name.clone())
            .collect(),
        None => Vec::new(),
    };

    if roles_satisfy(required, &held) {
        Ok(true)
    } else {
        tracing::warn!(user = %ctx.author().name, command = ctx.command().name, "Admin command refused");
        Err(BotError::Denied(format!(
            "You need one of these roles: {}",
            required.join(", ")
        )))
    }
}

async fn on_error(error: poise::FrameworkError<'_, Data, BotError>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(command = ctx.command().name, error = %error, "Command error");
            let reply = poise::CreateReply::default()
                .content(error.user_message())
                .ephemeral(true);
            let _ = ctx.send(reply).await;
        }
        poise::FrameworkError::CommandCheckFailed { error: Some(error), ctx, .. } => {
            let reply = poise::CreateReply::default()
                .content(error.user_message())
                .ephemeral(true);
            let _ = ctx.send(reply).await;
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!(error = %e, "Error handling error");
            }
        }
    }
}

pub fn framework(app: Arc<AppContext>) -> poise::Framework<Data, BotError> {
    let prefix = app.config.discord.prefix.clone();
    let guild_id = app.config.discord.guild_id.map(serenity::GuildId::new);

    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix,
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(bot = %ready.user.name, guilds = ready.guilds.len(), "Bot is ready");

                if let Some(guild_id) = guild_id {
                    poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id).await?;
                    tracing::info!(guild_id = %guild_id, "Slash commands registered to guild");
                } else {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    tracing::info!("Slash commands registered globally");
                }

                Ok(Data { app })
            })
        })
        .build()
}

pub fn intents() -> serenity::GatewayIntents {
    serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
}

/// Run the bot until shutdown. Background tasks post through the client's
/// HTTP handle.
pub async fn run(app: Arc<AppContext>, notices: crate::app::NoticeReceiver) -> anyhow::Result<()> {
    let token = app.config.discord_token()?;
    let mut client = serenity::ClientBuilder::new(token, intents())
        .framework(framework(Arc::clone(&app)))
        .await?;

    tasks::spawn_all(Arc::clone(&client.http), app, notices);

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping bot");
            shard_manager.shutdown_all().await;
        }
    });

    tracing::info!("Starting bot");
    client.start().await?;
    tracing::info!("Bot has shut down");
    Ok(())
}
