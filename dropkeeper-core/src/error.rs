use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropkeeperError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Section {section} not found in {source_name}")]
    ConfigSectionMissing { section: String, source_name: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Table creation failed for {table}: {reason}")]
    SchemaCreation { table: String, reason: String },

    #[error("Query failed, rolled back: {0}")]
    Query(String),

    #[error("Remote console unreachable: {0}")]
    RconConnection(String),

    #[error("Remote console rejected credentials for {0}")]
    RconAuth(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl DropkeeperError {
    /// Whether repeating the same remote call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DropkeeperError::RconConnection(_) | DropkeeperError::Timeout(_) | DropkeeperError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DropkeeperError>;
