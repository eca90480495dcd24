mod app;
mod bot;
mod remote;
mod web;

use anyhow::{Context, Result};
use app::AppContext;
use clap::{Parser, Subcommand};
use dropkeeper_core::AppConfig;
use dropkeeper_core::leaderboard::{drop_summary, leaderboard_text};
use dropkeeper_core::richtext::broadcast_command;
use dropkeeper_core::status::render_status;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(
    name = "dropkeeper",
    version = "0.1.0",
    about = "Drop leaderboard bot and remote console bridge for game servers",
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config/dropkeeper.toml")]
    config: PathBuf,

    /// Path to log file
    #[arg(long, global = true, default_value = "dropkeeper.log")]
    log_file: PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook endpoint and the chat bot
    Serve {
        /// Only run the webhook endpoint
        #[arg(long)]
        webhook_only: bool,
    },

    /// Create the configured tables if they do not exist
    InitDb,

    /// Print the drop leaderboard
    Leaderboard {
        /// Server name or LIKE pattern (defaults to the configured server)
        #[arg(long)]
        server: Option<String>,
        /// Number of entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print a player's drop count
    Drops {
        /// Player id as reported by the game
        user_id: String,
    },

    /// Run a remote console command on one server
    Rcon {
        /// Server number starting at 1, or server name
        server: String,
        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Broadcast a color-tagged message to every server
    Broadcast {
        /// Message, e.g. "{g}Restart{/} in 5 minutes"
        message: String,
    },

    /// Print player counts for every server
    Status,
}

fn setup_logging(verbose: u8, log_file: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(std::path::Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("dropkeeper.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    let (ctx, notices) = AppContext::open(config)?;

    match cli.command {
        Commands::Serve { webhook_only } => {
            info!("Starting dropkeeper");
            let webhook = tokio::spawn(web::serve(ctx.clone()));

            if webhook_only {
                tokio::spawn(log_notices(notices));
                webhook.await??;
            } else {
                tokio::select! {
                    result = webhook => result??,
                    result = bot::run(ctx, notices) => result?,
                }
            }
        }
        Commands::InitDb => {
            for table in [&ctx.drops, &ctx.links] {
                table.ensure_table()?;
                info!(table = table.name(), "Table ready");
            }
            println!("Tables ready under {}", ctx.config.storage.data_dir.display());
        }
        Commands::Leaderboard { server, limit } => {
            let board = &ctx.config.leaderboard;
            let server = server.unwrap_or_else(|| board.server_name.clone());
            println!("{}", leaderboard_text(&ctx.drops, &server, limit.unwrap_or(board.limit)));
        }
        Commands::Drops { user_id } => {
            println!("{}", drop_summary(&ctx.drops, &user_id));
        }
        Commands::Rcon { server, command } => {
            let client = ctx.resolve_server(&server).with_context(|| {
                format!("No server {}, pick 1 to {} or a configured name", server, ctx.config.servers.len())
            })?;
            let response = remote::execute(&client, &command.join(" "), &ctx.retry).await?;
            println!("{}", response);
        }
        Commands::Broadcast { message } => {
            let command = broadcast_command(&message);
            for client in ctx.servers() {
                println!("{}: {}", client.name(), remote::run_command(&client, &command, &ctx.retry).await);
            }
        }
        Commands::Status => {
            let statuses = bot::tasks::collect_statuses(&ctx).await;
            println!("{}", render_status(&statuses, ctx.started_at, chrono::Utc::now()));
        }
    }

    Ok(())
}

async fn log_notices(mut notices: app::NoticeReceiver) {
    while let Some(notice) = notices.recv().await {
        tracing::warn!(notice = %notice, "Notice not delivered, bot is not running");
    }
}
