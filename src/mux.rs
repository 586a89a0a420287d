//! Terminal multiplexer backends.
//!
//! Every VPN process runs detached inside a named tmux or screen session so
//! it survives the CLI exiting and can be inspected by hand
//! (`tmux attach -t vpn-pln_essdlc`). The [`Multiplexer`] trait is the only
//! thing the lifecycle code sees; tests swap in an in-process fake.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("failed to run {backend}: {source}")]
    Spawn {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{backend} {action} failed: {stderr}")]
    Command {
        backend: &'static str,
        action: &'static str,
        stderr: String,
    },
}

/// Which multiplexer manages the VPN sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Tmux,
    Screen,
}

impl Backend {
    pub fn binary(self) -> &'static str {
        match self {
            Backend::Tmux => "tmux",
            Backend::Screen => "screen",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Session operations the lifecycle code needs from a multiplexer.
pub trait Multiplexer {
    fn backend(&self) -> Backend;

    /// Start `argv` detached inside a new session named `session`, with the
    /// working directory set to `cwd`.
    fn spawn(&self, session: &str, cwd: &Path, argv: &[String]) -> Result<(), MuxError>;

    /// Whether a session with exactly this name is alive.
    fn has_session(&self, session: &str) -> Result<bool, MuxError>;

    fn kill_session(&self, session: &str) -> Result<(), MuxError>;

    fn list_sessions(&self) -> Result<Vec<String>, MuxError>;

    /// Last `lines` non-empty lines of session output, for status display.
    fn capture_tail(&self, session: &str, lines: usize) -> Result<Vec<String>, MuxError>;
}

/// Get the multiplexer for the configured backend.
pub fn for_backend(backend: Backend) -> Box<dyn Multiplexer> {
    match backend {
        Backend::Tmux => Box::new(TmuxBackend::new()),
        Backend::Screen => Box::new(ScreenBackend::new()),
    }
}

pub struct TmuxBackend;

impl TmuxBackend {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        Command::new("tmux")
            .args(args)
            .output()
            .map_err(|e| MuxError::Spawn { backend: "tmux", source: e })
    }
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for TmuxBackend {
    fn backend(&self) -> Backend {
        Backend::Tmux
    }

    fn spawn(&self, session: &str, cwd: &Path, argv: &[String]) -> Result<(), MuxError> {
        let output = Command::new("tmux")
            .args(["new-session", "-d", "-s", session])
            .args(argv)
            .current_dir(cwd)
            .output()
            .map_err(|e| MuxError::Spawn { backend: "tmux", source: e })?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "new-session",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn has_session(&self, session: &str) -> Result<bool, MuxError> {
        // `=` forces an exact name match; tmux otherwise prefix-matches targets.
        let target = format!("={session}");
        let output = self.run(&["has-session", "-t", &target])?;
        Ok(output.status.success())
    }

    fn kill_session(&self, session: &str) -> Result<(), MuxError> {
        let target = format!("={session}");
        let output = self.run(&["kill-session", "-t", &target])?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "kill-session",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"])?;
        if !output.status.success() {
            // tmux exits non-zero when no server is running; that just means
            // there are no sessions.
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }

    fn capture_tail(&self, session: &str, lines: usize) -> Result<Vec<String>, MuxError> {
        let target = format!("={session}");
        let output = self.run(&["capture-pane", "-p", "-t", &target])?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "tmux",
                action: "capture-pane",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(tail_lines(&String::from_utf8_lossy(&output.stdout), lines))
    }
}

pub struct ScreenBackend;

impl ScreenBackend {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        Command::new("screen")
            .args(args)
            .output()
            .map_err(|e| MuxError::Spawn { backend: "screen", source: e })
    }
}

impl Default for ScreenBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer for ScreenBackend {
    fn backend(&self) -> Backend {
        Backend::Screen
    }

    fn spawn(&self, session: &str, cwd: &Path, argv: &[String]) -> Result<(), MuxError> {
        let output = Command::new("screen")
            .args(["-d", "-m", "-S", session])
            .args(argv)
            .current_dir(cwd)
            .output()
            .map_err(|e| MuxError::Spawn { backend: "screen", source: e })?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "screen",
                action: "spawn",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn has_session(&self, session: &str) -> Result<bool, MuxError> {
        Ok(self.list_sessions()?.iter().any(|s| s == session))
    }

    fn kill_session(&self, session: &str) -> Result<(), MuxError> {
        let output = self.run(&["-S", session, "-X", "kill"])?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "screen",
                action: "kill",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        // `screen -ls` exits non-zero even on success in some versions, so
        // only the output is trusted.
        let output = self.run(&["-ls"])?;
        Ok(parse_screen_sessions(&String::from_utf8_lossy(&output.stdout)))
    }

    fn capture_tail(&self, session: &str, lines: usize) -> Result<Vec<String>, MuxError> {
        let path = std::env::temp_dir().join(format!("ovpnctl-hardcopy-{session}"));
        let output = self.run(&["-S", session, "-X", "hardcopy", &path.to_string_lossy()])?;
        if !output.status.success() {
            return Err(MuxError::Command {
                backend: "screen",
                action: "hardcopy",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // The dump is written by the session process, not the command above.
        thread::sleep(Duration::from_millis(100));
        let text = std::fs::read_to_string(&path).unwrap_or_default();
        let _ = std::fs::remove_file(&path);
        Ok(tail_lines(&text, lines))
    }
}

/// Session names out of `screen -ls` output. Lines look like
/// `\t1234.vpn-pln_essdlc\t(Detached)`; everything else is chrome.
fn parse_screen_sessions(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let token = line.trim().split_whitespace().next()?;
            let (pid, name) = token.split_once('.')?;
            if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}

fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<String> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip).collect()
}
