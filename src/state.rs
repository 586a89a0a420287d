//! Tracked VPN sessions, stored in `~/.ovpnctl/state.json`.
//!
//! The state file is the single source of truth for what ovpnctl believes is
//! connected; the multiplexer is the source of truth for what actually runs.
//! All mutation goes through [`LockedState`] so two invocations cannot
//! interleave their read-modify-write cycles.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::mux::Backend;

/// One tracked VPN session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Profile id, e.g. `"pln/essdlc"`.
    pub profile: String,
    /// Multiplexer session name, e.g. `"vpn-pln_essdlc"`.
    pub session: String,
    pub backend: Backend,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct State {
    /// Tracked sessions, keyed by profile id.
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionRecord>,

    /// When the state was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl State {
    /// Read state from file, returning default if file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| Error::StateParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write state to file atomically (without locking - use [`LockedState`]
    /// for concurrent safety)
    ///
    /// Uses atomic write pattern: write to temp file, then rename.
    /// This ensures the state file is never corrupted even if the process crashes.
    pub(crate) fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| Error::StateParse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content).map_err(|e| Error::Io {
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// A locked state file handle for safe concurrent access
pub struct LockedState {
    file: File,
    state: State,
    path: std::path::PathBuf,
}

impl LockedState {
    /// Open and lock the state file for exclusive access
    pub fn lock(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        // Blocks until any concurrent invocation releases it.
        file.lock_exclusive().map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let state = Self::read_from_file(&file, path)?;

        Ok(Self {
            file,
            state,
            path: path.to_path_buf(),
        })
    }

    fn read_from_file(mut file: &File, path: &Path) -> Result<State> {
        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(State::default());
        }

        serde_json::from_str(&content).map_err(|e| Error::StateParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the current state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Update and save the state
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut State),
    {
        f(&mut self.state);
        self.state.updated_at = Some(Utc::now());
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.state).map_err(|e| Error::StateParse {
            path: self.path.clone(),
            source: e,
        })?;

        let io_err = |e: std::io::Error| Error::Io {
            path: self.path.clone(),
            source: e,
        };

        // Truncate and write from beginning
        self.file.set_len(0).map_err(io_err)?;
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        self.file.write_all(content.as_bytes()).map_err(io_err)?;
        self.file.sync_all().map_err(io_err)?;

        Ok(())
    }
}

impl Drop for LockedState {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = self.file.unlock();
    }
}
