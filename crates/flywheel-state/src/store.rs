//! StatusFile — JSON persistence of the lifecycle snapshot.
//!
//! The document has the same shape as a lifecycle reply body. Writes go to
//! a temporary file in the target directory which is then renamed over the
//! old document, so a crash mid-write never leaves a truncated file behind.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use flywheel_core::LifecycleSnapshot;
use tracing::debug;

use crate::error::{StateError, StateResult};

/// Location of the persisted lifecycle snapshot.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last saved snapshot. A missing file is not an error.
    pub fn load(&self) -> StateResult<Option<LifecycleSnapshot>> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no status file yet");
                return Ok(None);
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let snapshot: LifecycleSnapshot =
            serde_json::from_slice(&raw).map_err(|e| StateError::Deserialize(e.to_string()))?;
        debug!(path = ?self.path, status = %snapshot.status, "status file loaded");
        Ok(Some(snapshot))
    }

    /// Replace the status file with `snapshot`.
    pub fn save(&self, snapshot: &LifecycleSnapshot) -> StateResult<()> {
        let body =
            serde_json::to_vec(snapshot).map_err(|e| StateError::Serialize(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = ?self.path, status = %snapshot.status, "status file written");
        Ok(())
    }
}
