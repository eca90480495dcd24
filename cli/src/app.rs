//! Application context built once at start-up and shared by the bot, the
//! webhook and the scheduled tasks.

use crate::remote::RetryPolicy;
use chrono::{DateTime, Utc};
use dropkeeper_core::mod_config::ModConfigStore;
use dropkeeper_core::{AppConfig, DropkeeperError, RconClient, Result, Table};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct AppContext {
    pub config: AppConfig,
    pub drops: Table,
    pub links: Table,
    pub mod_configs: ModConfigStore,
    pub started_at: DateTime<Utc>,
    pub retry: RetryPolicy,
    notices: mpsc::UnboundedSender<String>,
}

/// Messages waiting to be posted to the leaderboard channel.
pub type NoticeReceiver = mpsc::UnboundedReceiver<String>;

impl AppContext {
    /// Open both tables under the configured data directory.
    pub fn open(config: AppConfig) -> Result<(Arc<Self>, NoticeReceiver)> {
        let storage = &config.storage;
        let drops = Table::open(
            &storage.data_dir,
            &storage.drops_table,
            config.schema(&storage.drops_table)?,
        )?;
        let links = Table::open(
            &storage.data_dir,
            &storage.links_table,
            config.schema(&storage.links_table)?,
        )?;
        let mod_configs = ModConfigStore::new(&storage.mod_config_file);

        Ok(Self::assemble(config, drops, links, mod_configs))
    }

    /// Like [`open`](Self::open), with both tables held in memory.
    #[cfg(test)]
    pub fn in_memory(config: AppConfig, mod_configs: ModConfigStore) -> Result<(Arc<Self>, NoticeReceiver)> {
        let storage = &config.storage;
        let drops = Table::open_in_memory(&storage.drops_table, config.schema(&storage.drops_table)?)?;
        let links = Table::open_in_memory(&storage.links_table, config.schema(&storage.links_table)?)?;

        Ok(Self::assemble(config, drops, links, mod_configs))
    }

    fn assemble(
        config: AppConfig,
        drops: Table,
        links: Table,
        mod_configs: ModConfigStore,
    ) -> (Arc<Self>, NoticeReceiver) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let retry = RetryPolicy::from(&config.rcon);
        let ctx = Self {
            config,
            drops,
            links,
            mod_configs,
            started_at: Utc::now(),
            retry,
            notices,
        };
        (Arc::new(ctx), receiver)
    }

    /// Queue a message for the chat channel. Dropped with a warning when no
    /// bot is running to deliver it.
    pub fn notify(&self, message: String) {
        if let Err(e) = self.notices.send(message) {
            tracing::warn!(message = %e.0, "No chat channel to deliver notice to");
        }
    }

    /// Run a storage call on the blocking pool so slow disk access does not
    /// stall the runtime.
    pub async fn blocking<T, F>(self: &Arc<Self>, job: F) -> Result<T>
    where
        F: FnOnce(&AppContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let ctx = Arc::clone(self);
        tokio::task::spawn_blocking(move || job(&ctx))
            .await
            .map_err(|e| DropkeeperError::Io(e.into()))
    }

    pub fn servers(&self) -> Vec<RconClient> {
        self.config.servers.iter().map(RconClient::from_server).collect()
    }

    /// Server by 1-based position in the configured list.
    pub fn server_at(&self, index: usize) -> Option<RconClient> {
        index
            .checked_sub(1)
            .and_then(|i| self.config.servers.get(i))
            .map(RconClient::from_server)
    }

    /// Server by 1-based position or by name, ignoring case.
    pub fn resolve_server(&self, target: &str) -> Option<RconClient> {
        match target.trim().parse::<usize>() {
            Ok(index) => self.server_at(index),
            Err(_) => self.config.server(target.trim()).map(RconClient::from_server),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const CONFIG: &str = r#"
[leaderboard]
server_name = "Island"

[[servers]]
name = "Island"
host = "127.0.0.1"
port = 27020
password = "pw"

[[servers]]
name = "Ragnarok"
host = "127.0.0.1"
port = 27021
password = "pw"

[tables.NAE]
server_name = "TEXT"
user_id = "TEXT"
character_name = "TEXT"
item_dropped = "TEXT"
chance = "TEXT"
dropped_by_dino = "TEXT"
server_max_level = "TEXT"
had_4_leaf_clover = "TEXT"
server_drop_chance = "TEXT"
"*suid" = "TEXT"

[tables.player_links]
"*display_name" = "TEXT"
steam_id = "TEXT"
eos_id = "TEXT"
"#;

    pub(crate) fn test_context(dir: &std::path::Path) -> (Arc<AppContext>, NoticeReceiver) {
        let config = AppConfig::from_str(CONFIG).unwrap();
        AppContext::in_memory(config, ModConfigStore::new(dir.join("mod_config.json"))).unwrap()
    }

    #[test]
    fn test_server_at_is_one_based() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());
        assert_eq!(ctx.server_at(1).unwrap().name(), "Island");
        assert_eq!(ctx.server_at(2).unwrap().name(), "Ragnarok");
        assert!(ctx.server_at(0).is_none());
        assert!(ctx.server_at(3).is_none());
    }

    #[test]
    fn test_resolve_server_by_position_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());
        assert_eq!(ctx.resolve_server("2").unwrap().name(), "Ragnarok");
        assert_eq!(ctx.resolve_server("ragnarok").unwrap().name(), "Ragnarok");
        assert_eq!(ctx.resolve_server(" Island ").unwrap().name(), "Island");
        assert!(ctx.resolve_server("Aberration").is_none());
        assert!(ctx.resolve_server("0").is_none());
    }

    #[tokio::test]
    async fn test_blocking_runs_against_context() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_context(dir.path());
        let name = ctx.blocking(|app| app.drops.name().to_string()).await.unwrap();
        assert_eq!(name, "NAE");
    }

    #[test]
    fn test_open_creates_table_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{}\n[storage]\ndata_dir = {:?}\n", CONFIG, dir.path().join("data"));
        let config = AppConfig::from_str(&content).unwrap();
        let (_ctx, _rx) = AppContext::open(config).unwrap();

        assert!(dir.path().join("data").join("NAE.db").exists());
        assert!(dir.path().join("data").join("player_links.db").exists());
    }

    #[tokio::test]
    async fn test_notices_reach_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = test_context(dir.path());
        ctx.notify("Failed Insert: {}".to_string());
        assert_eq!(rx.recv().await.unwrap(), "Failed Insert: {}");
    }
}
