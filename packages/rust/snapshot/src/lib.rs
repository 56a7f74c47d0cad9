//! Atomic snapshot persistence.
//!
//! The snapshot is a single JSON document at a configured path. [`SnapshotStore::save`]
//! writes a sibling temp file and renames it over the target, so a crash
//! mid-save never leaves a partially written snapshot observable by a later
//! [`SnapshotStore::load`].

use std::path::{Path, PathBuf};

use tracing::debug;

use rosterboard_shared::{CURRENT_SCHEMA_VERSION, Result, RosterboardError, Snapshot};

/// Load/save handle for the persisted [`Snapshot`].
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store for the given snapshot path. Nothing is touched on disk
    /// until the first `load`/`save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The snapshot path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted snapshot. A missing file is not an error: it means
    /// no run has completed yet, and an empty snapshot is returned.
    pub fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot on disk, starting empty");
            return Ok(Snapshot::empty());
        }

        let content =
            std::fs::read_to_string(&self.path).map_err(|e| RosterboardError::io(&self.path, e))?;

        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            RosterboardError::Snapshot(format!("invalid snapshot {}: {e}", self.path.display()))
        })?;

        if snapshot.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(RosterboardError::validation(format!(
                "snapshot schema_version {} is newer than supported version {}",
                snapshot.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }

        debug!(
            path = %self.path.display(),
            worlds = snapshot.worlds.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Persist the snapshot, replacing any previous one atomically.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| RosterboardError::io(parent, e))?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| RosterboardError::Snapshot(format!("serialize snapshot: {e}")))?;

        // Atomic replace: write a sibling temp file, then rename over the target.
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| RosterboardError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| RosterboardError::io(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            worlds = snapshot.worlds.len(),
            links = snapshot.message_links.len(),
            "snapshot saved"
        );
        Ok(())
    }
}
