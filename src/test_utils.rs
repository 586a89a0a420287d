//! Test utilities shared across test modules
//!
//! This module provides common helper functions for testing, avoiding
//! duplication across multiple test suites: a temp-dir Paths layout, a
//! ready-made config with its OpenVPN files on disk, and an in-process
//! multiplexer fake.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tempfile::TempDir;

use crate::config::{
    Config, Hooks, Location, LoggingConfig, MatcherConfig, Network, OpenVpnConfig, SessionConfig,
};
use crate::mux::{Backend, Multiplexer, MuxError};
use crate::paths::Paths;
use crate::state::SessionRecord;

/// Create a Paths struct for testing using a temporary directory
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    Paths {
        app_dir: temp_dir.path().join(".ovpnctl"),
        config_file: temp_dir.path().join(".ovpnctl/config.toml"),
        state_file: temp_dir.path().join(".ovpnctl/state.json"),
        log_file: temp_dir.path().join(".ovpnctl/ovpnctl.log"),
    }
}

/// Config with three profiles (pln/essdlc aliased "ess", pln/mgmt, dal/mup)
/// rooted in the temp directory. The .ovpn files really exist and the
/// startup delay is zero so connect tests do not sleep.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let base_dir = temp_dir.path().join("ovpn");
    for (dir, file) in [
        ("pln", "essdlc.ovpn"),
        ("pln", "mgmt.ovpn"),
        ("dal", "mup.ovpn"),
    ] {
        let loc_dir = base_dir.join(dir);
        std::fs::create_dir_all(&loc_dir).unwrap();
        std::fs::write(loc_dir.join(file), "remote vpn.example.net 1194\n").unwrap();
    }

    let mut locations = BTreeMap::new();
    locations.insert(
        "pln".to_string(),
        Location {
            description: "Planet Lab".to_string(),
            directory: "pln".to_string(),
            allow_simultaneous: false,
            networks: BTreeMap::from([
                (
                    "essdlc".to_string(),
                    Network {
                        file: "essdlc.ovpn".to_string(),
                        description: "ESS DLC".to_string(),
                        aliases: vec!["ess".to_string()],
                    },
                ),
                (
                    "mgmt".to_string(),
                    Network {
                        file: "mgmt.ovpn".to_string(),
                        description: String::new(),
                        aliases: vec![],
                    },
                ),
            ]),
        },
    );
    locations.insert(
        "dal".to_string(),
        Location {
            description: "Dallas".to_string(),
            directory: "dal".to_string(),
            allow_simultaneous: false,
            networks: BTreeMap::from([(
                "mup".to_string(),
                Network {
                    file: "mup.ovpn".to_string(),
                    description: String::new(),
                    aliases: vec![],
                },
            )]),
        },
    );

    Config {
        base_dir,
        session: SessionConfig {
            startup_delay: 0,
            ..SessionConfig::default()
        },
        openvpn: OpenVpnConfig::default(),
        matcher: MatcherConfig::default(),
        logging: LoggingConfig::default(),
        locations,
        hooks: Hooks::default(),
    }
}

/// A session record shaped the way `connect` writes it.
pub fn record(profile: &str) -> SessionRecord {
    record_for(profile, Backend::Tmux)
}

/// Like [`record`], but tracked under a chosen backend.
pub fn record_for(profile: &str, backend: Backend) -> SessionRecord {
    SessionRecord {
        profile: profile.to_string(),
        session: format!("vpn-{}", profile.replace('/', "_")),
        backend,
        connected_at: Utc::now(),
    }
}

/// In-process stand-in for tmux/screen: tracks named sessions in a set and
/// records every call for assertions.
pub struct FakeMux {
    sessions: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    has_session_error: Mutex<Option<String>>,
}

impl FakeMux {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
            has_session_error: Mutex::new(None),
        }
    }

    pub fn with_sessions(names: &[&str]) -> Self {
        let fake = Self::new();
        {
            let mut sessions = fake.sessions.lock().unwrap();
            for name in names {
                sessions.insert(name.to_string());
            }
        }
        fake
    }

    /// Simulate the VPN process dying outside ovpnctl.
    pub fn drop_session(&self, session: &str) {
        self.sessions.lock().unwrap().remove(session);
    }

    /// Make every subsequent liveness probe fail with this message.
    pub fn fail_has_session(&self, message: &str) {
        *self.has_session_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn alive(&self, session: &str) -> bool {
        self.sessions.lock().unwrap().contains(session)
    }

    pub fn session_names(&self) -> Vec<String> {
        self.sessions.lock().unwrap().iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for FakeMux {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for FakeMux {
    fn backend(&self) -> Backend {
        Backend::Tmux
    }

    fn spawn(&self, session: &str, cwd: &Path, argv: &[String]) -> Result<(), MuxError> {
        self.log(format!("spawn {} in {} {}", session, cwd.display(), argv.join(" ")));
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.insert(session.to_string()) {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "new-session",
                stderr: format!("duplicate session: {session}"),
            });
        }
        Ok(())
    }

    fn has_session(&self, session: &str) -> Result<bool, MuxError> {
        if let Some(message) = self.has_session_error.lock().unwrap().clone() {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "has-session",
                stderr: message,
            });
        }
        Ok(self.alive(session))
    }

    fn kill_session(&self, session: &str) -> Result<(), MuxError> {
        self.log(format!("kill {session}"));
        if !self.sessions.lock().unwrap().remove(session) {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "kill-session",
                stderr: format!("session not found: {session}"),
            });
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        Ok(self.session_names())
    }

    fn capture_tail(&self, session: &str, lines: usize) -> Result<Vec<String>, MuxError> {
        if !self.alive(session) {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "capture-pane",
                stderr: format!("session not found: {session}"),
            });
        }
        Ok(vec!["Initialization Sequence Completed".to_string()]
            .into_iter()
            .take(lines)
            .collect())
    }
}
