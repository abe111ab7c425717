//! On-disk session snapshot, so a mapping survives between CLI invocations

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mapping::Mapping;
use crate::session::SessionState;

/// Default snapshot location, relative to the working directory
pub const DEFAULT_SNAPSHOT_PATH: &str = ".pseudonymizer/session.json";

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u8 = 1;

/// Everything needed to resume a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version
    pub version: u8,
    /// ISO8601 timestamp of when this was taken
    pub saved_at: String,
    /// Next sequence number for counter-minted tokens
    pub counter: u64,
    #[serde(default)]
    pub state: SessionState,
    /// Literal -> token table in normalized order
    pub mapping: Mapping,
    /// Last plain text the session processed
    #[serde(default)]
    pub plain_text: String,
    /// Last pseudonymized text the session produced or restored
    #[serde(default)]
    pub pseudonymized_text: String,
}

/// Manager for persisting a session snapshot to disk
pub struct SnapshotStore {
    file_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    /// Store at the default location under `root`
    pub fn in_dir(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_SNAPSHOT_PATH))
    }

    /// Load the snapshot, if one has been saved
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read session file: {}", self.file_path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.file_path.display()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            anyhow::bail!(
                "Session file {} has version {}, newer than supported version {}",
                self.file_path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }

        Ok(Some(snapshot))
    }

    /// Save the snapshot, creating parent directories as needed
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create session directory")?;
            }
        }
        let content =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize session")?;
        fs::write(&self.file_path, content).context("Failed to write session file")?;
        Ok(())
    }

    /// Delete the snapshot file
    pub fn delete(&self) -> Result<()> {
        if self.file_path.exists() {
            fs::remove_file(&self.file_path).context("Failed to delete session file")?;
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}
