//! Mod configuration documents, stored as one JSON object keyed by mod name.

use crate::error::{DropkeeperError, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

/// Saves and loads are serialized, and each save replaces the file with a
/// fully written temp file so readers never see a partial document.
#[derive(Debug)]
pub struct ModConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ModConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| DropkeeperError::Io(std::io::Error::other("mod config lock is poisoned")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(DropkeeperError::Parse(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    /// Replace the document stored for `mod_name`, keeping the others.
    pub fn save(&self, mod_name: &str, config: Value) -> Result<()> {
        if mod_name.trim().is_empty() {
            return Err(DropkeeperError::Validation("mod name is empty".to_string()));
        }

        let _guard = self.guard()?;
        let mut all = self.read_all()?;
        all.insert(mod_name.to_string(), config);
        self.write_all(&all)?;

        tracing::info!(mod_name, path = %self.path.display(), "Saved mod config");
        Ok(())
    }

    pub fn load(&self, mod_name: &str) -> Result<Option<Value>> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.remove(mod_name))
    }

    fn write_all(&self, all: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(serde_json::to_string_pretty(all)?.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| DropkeeperError::Io(e.error))?;
        Ok(())
    }
}
