//! Ledger persistence.
//!
//! The ledger is a whole-file-as-database: one JSON array, single writer,
//! atomic temp-file + rename on every save. That consistency contract is
//! explicit here -- this is not a transactional store, and multi-process
//! writers are out of scope.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::LedgerError;
use crate::ledger::LedgerEntry;

pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Vec<LedgerEntry>, LedgerError>;
    fn save(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError>;
}

/// JSON file store. A missing file is an empty ledger.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(LedgerError::LoadFailed {
                    path: self.path.clone(),
                    message: err.to_string(),
                })
            }
        };
        serde_json::from_str(&content).map_err(|err| LedgerError::LoadFailed {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    fn save(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(entries).map_err(|err| LedgerError::SaveFailed {
            path: self.path.clone(),
            message: err.to_string(),
        })?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)
            .and_then(|()| std::fs::rename(&temp, &self.path))
            .map_err(|err| LedgerError::SaveFailed {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }
}

/// In-memory store for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.entries.lock().map(|e| e.clone()).unwrap_or_default())
    }

    fn save(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        if let Ok(mut slot) = self.entries.lock() {
            *slot = entries.to_vec();
        }
        Ok(())
    }
}
