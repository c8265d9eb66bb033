//! Persistence of the last blocked diagnostic.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A diagnostic as persisted by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDiagnostic {
    /// The capped diagnostic object.
    pub diag: Map<String, Value>,
    /// When the collector accepted it.
    pub received_at: DateTime<Utc>,
}

impl StoredDiagnostic {
    /// A string field of the diagnostic.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.diag.get(name).and_then(Value::as_str)
    }

    /// Pre-rendered summary, or a minimal one built from the reason fields.
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(summary) = self.field("summary").filter(|s| !s.is_empty()) {
            return summary.to_string();
        }
        let mut lines = vec!["Payguard diagnostic".to_string()];
        for key in ["provider", "reason", "details", "url"] {
            if let Some(value) = self.field(key).filter(|v| !v.is_empty()) {
                lines.push(format!("{key}: {value}"));
            }
        }
        lines.join("\n")
    }
}

/// Holds the single most recent diagnostic.
pub trait DiagnosticStore: Send + Sync + fmt::Debug {
    /// Replace the stored diagnostic. Either the new record is fully written
    /// or the previous one is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] or [`Error::Io`] when the write fails.
    fn save(&self, record: &StoredDiagnostic) -> Result<()>;

    /// The stored diagnostic, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the stored record cannot be read or decoded.
    fn load(&self) -> Result<Option<StoredDiagnostic>>;
}

/// JSON file store with atomic replacement.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store at `path`. Parent directories are created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticStore for FileStore {
    fn save(&self, record: &StoredDiagnostic) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut file, record)?;
        file.flush()?;
        file.persist(&self.path)
            .map_err(|e| Error::Store(format!("failed to replace {}: {}", self.path.display(), e.error)))?;
        debug!("diagnostic stored at {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredDiagnostic>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<StoredDiagnostic>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticStore for MemoryStore {
    fn save(&self, record: &StoredDiagnostic) -> Result<()> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredDiagnostic>> {
        Ok(self.record.lock().clone())
    }
}
