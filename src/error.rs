//! Crate-wide error type.
//!
//! Core modules return [`Error`] so callers can tell a resolution failure
//! apart from a lifecycle failure without parsing strings. The CLI layer in
//! `commands` converts into `anyhow` for display.

use std::path::PathBuf;

use thiserror::Error;

use crate::mux::{Backend, MuxError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("failed to parse {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("no profile matches '{query}'")]
    NoMatch {
        query: String,
        /// Close-but-not-close-enough profile ids, best first.
        suggestions: Vec<String>,
    },

    #[error("'{query}' is ambiguous, matches: {}", .candidates.join(", "))]
    AmbiguousMatch {
        query: String,
        candidates: Vec<String>,
    },

    #[error("already connected to '{0}'")]
    AlreadyConnected(String),

    #[error("not connected to '{0}'")]
    NotConnected(String),

    #[error("'{profile}' is tracked under {record}, but the configured backend is {configured}")]
    BackendMismatch {
        profile: String,
        record: Backend,
        configured: Backend,
    },

    #[error("required hook '{name}' failed: {reason}")]
    HookFailed { name: String, reason: String },

    #[error("location '{location}' does not allow simultaneous connections (active: {})", .active.join(", "))]
    LocationBusy {
        location: String,
        active: Vec<String>,
    },

    #[error("OpenVPN config file missing: {}", .0.display())]
    ProfileFileMissing(PathBuf),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {}: {source}", .path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
