//! Application configuration loaded from a single TOML file.

use crate::error::{DropkeeperError, Result};
use crate::models::{DropEvent, PlayerLink};
use crate::schema::{SchemaDescriptor, is_identifier};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// One year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub rcon: RetryConfig,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Column declarations per table, `"*name"` marking primary-key columns.
    #[serde(default)]
    pub tables: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    pub guild_id: Option<u64>,
    pub leaderboard_channel_id: Option<u64>,
    pub status_channel_id: Option<u64>,
    /// Roles allowed to run admin commands. Empty leaves them open.
    pub admin_roles: Vec<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub bind: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub drops_table: String,
    pub links_table: String,
    pub mod_config_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            drops_table: "NAE".to_string(),
            links_table: "player_links".to_string(),
            mod_config_file: PathBuf::from("config/mod_config.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Server name (or SQL `LIKE` pattern) the leaderboard is built for.
    pub server_name: String,
    pub daily: bool,
    pub interval_hours: u64,
    pub limit: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            server_name: String::new(),
            daily: true,
            interval_hours: 24,
            limit: crate::leaderboard::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
        }
    }
}

/// Per-attempt timeout and bounded retry for remote console calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub timeout_secs: u64,
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            attempts: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: String,
}

impl AppConfig {
    /// Read, parse and validate the configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DropkeeperError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DropkeeperError::Parse(format!("Failed to parse config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.leaderboard.server_name.trim().is_empty() {
            return Err(DropkeeperError::Config("leaderboard.server_name is empty".to_string()));
        }
        if self.leaderboard.interval_hours == 0 || self.leaderboard.limit == 0 {
            return Err(DropkeeperError::Config(
                "leaderboard interval and limit must be positive".to_string(),
            ));
        }
        if self.leaderboard.interval_hours > MAX_INTERVAL_HOURS {
            return Err(DropkeeperError::Config(format!(
                "leaderboard.interval_hours must be at most {}",
                MAX_INTERVAL_HOURS
            )));
        }
        if self.status.interval_secs == 0 {
            return Err(DropkeeperError::Config("status.interval_secs must be positive".to_string()));
        }
        if self.rcon.attempts == 0 || self.rcon.timeout_secs == 0 {
            return Err(DropkeeperError::Config(
                "rcon.attempts and rcon.timeout_secs must be positive".to_string(),
            ));
        }

        let ids = [
            self.discord.guild_id,
            self.discord.leaderboard_channel_id,
            self.discord.status_channel_id,
        ];
        if ids.contains(&Some(0)) {
            return Err(DropkeeperError::Config("Discord ids must be non-zero".to_string()));
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() || server.host.trim().is_empty() || server.port == 0 {
                return Err(DropkeeperError::Config(format!(
                    "Server entry {:?} needs a name, host and port",
                    server.name
                )));
            }
            if !names.insert(server.name.to_lowercase()) {
                return Err(DropkeeperError::Config(format!("Duplicate server name {}", server.name)));
            }
        }

        let drops = self.schema(&self.storage.drops_table)?;
        require_columns(&self.storage.drops_table, &drops, &DropEvent::COLUMNS)?;
        let links = self.schema(&self.storage.links_table)?;
        require_columns(&self.storage.links_table, &links, &PlayerLink::COLUMNS)?;

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.webhook
            .bind
            .parse()
            .map_err(|e| DropkeeperError::Config(format!("Invalid webhook bind {}: {}", self.webhook.bind, e)))
    }

    /// Schema declared under `[tables.<name>]`.
    pub fn schema(&self, name: &str) -> Result<SchemaDescriptor> {
        if !is_identifier(name) {
            return Err(DropkeeperError::Config(format!("Invalid table name {}", name)));
        }
        SchemaDescriptor::from_section(&self.tables, name)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Bot token, with `DISCORD_TOKEN` taking precedence over the file.
    pub fn discord_token(&self) -> Result<String> {
        resolve_token(&self.discord.token, std::env::var(TOKEN_ENV).ok())
    }
}

fn require_columns(table: &str, schema: &SchemaDescriptor, columns: &[&str]) -> Result<()> {
    let missing: Vec<&str> = columns.iter().copied().filter(|c| !schema.contains(c)).collect();
    if !missing.is_empty() {
        return Err(DropkeeperError::Config(format!(
            "Table {} is missing columns: {}",
            table,
            missing.join(", ")
        )));
    }
    Ok(())
}

fn resolve_token(file_token: &str, env_token: Option<String>) -> Result<String> {
    env_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| Some(file_token.to_string()).filter(|t| !t.trim().is_empty()))
        .ok_or_else(|| {
            DropkeeperError::Config(format!("No bot token: set discord.token or {}", TOKEN_ENV))
        })
}
