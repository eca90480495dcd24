//! Core library for the Dropkeeper game-community bot: drop event storage,
//! leaderboards, player links and remote console access.

pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod leaderboard;
pub mod links;
pub mod mod_config;
pub mod models;
pub mod permissions;
pub mod rcon;
pub mod richtext;
pub mod schedule;
pub mod schema;
pub mod status;

pub use config::AppConfig;
pub use database::{Filter, QueryOutcome, Row, Table};
pub use error::{DropkeeperError, Result};
pub use ingest::ingest_drop;
pub use models::{DropEvent, LeaderboardEntry, PlayerLink};
pub use rcon::RconClient;
pub use schema::SchemaDescriptor;
