//! Lifecycle hooks.
//!
//! Hooks are plain shell commands run around connect and disconnect, in the
//! order they appear in the config. A required hook that fails aborts the
//! operation; an optional one just logs a warning. Each hook gets a deadline
//! so a wedged script cannot hang the CLI.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreConnect,
    PostConnect,
    PreDisconnect,
    PostDisconnect,
}

impl HookPhase {
    pub fn label(self) -> &'static str {
        match self {
            HookPhase::PreConnect => "pre-connect",
            HookPhase::PostConnect => "post-connect",
            HookPhase::PreDisconnect => "pre-disconnect",
            HookPhase::PostDisconnect => "post-disconnect",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One hook entry from the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub name: String,
    /// Run through `sh -c`.
    pub command: String,
    #[serde(default)]
    pub description: String,
    /// Required hooks abort the operation on failure.
    #[serde(default)]
    pub required: bool,
    /// Seconds before the hook is killed.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Run every hook of one phase in config order.
pub fn run_hooks(phase: HookPhase, hooks: &[Hook]) -> Result<()> {
    for hook in hooks {
        debug!(hook = %hook.name, phase = %phase, "running hook");
        match run_one(hook) {
            Ok(()) => info!(hook = %hook.name, phase = %phase, "hook completed"),
            Err(reason) => {
                if hook.required {
                    return Err(Error::HookFailed {
                        name: hook.name.clone(),
                        reason,
                    });
                }
                warn!(hook = %hook.name, phase = %phase, %reason, "optional hook failed");
            }
        }
    }
    Ok(())
}

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

fn scratch_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "ovpnctl-hook-stderr-{}-{}",
        std::process::id(),
        SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Read and delete the stderr scratch file.
fn drain_scratch(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let _ = std::fs::remove_file(path);
    text.trim().to_string()
}

fn run_one(hook: &Hook) -> std::result::Result<(), String> {
    // stderr goes to a scratch file, not a pipe: nothing drains a pipe while
    // the wait loop polls, so a chatty hook would block once the buffer
    // filled and then get killed at the deadline despite doing fine.
    let scratch = scratch_path();
    let stderr_file =
        File::create(&scratch).map_err(|e| format!("could not open {}: {e}", scratch.display()))?;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&hook.command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .map_err(|e| format!("could not start: {e}"))?;

    let deadline = Instant::now() + Duration::from_secs(hook.timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let stderr = drain_scratch(&scratch);
                    if stderr.is_empty() {
                        return Err(format!("timed out after {}s", hook.timeout));
                    }
                    return Err(format!("timed out after {}s: {stderr}", hook.timeout));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                let _ = std::fs::remove_file(&scratch);
                return Err(format!("wait failed: {e}"));
            }
        }
    };

    let stderr = drain_scratch(&scratch);
    if status.success() {
        return Ok(());
    }
    if stderr.is_empty() {
        Err(format!("exited with {status}"))
    } else {
        Err(format!("exited with {status}: {stderr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(command: &str, required: bool, timeout: u64) -> Hook {
        Hook {
            name: "test-hook".to_string(),
            command: command.to_string(),
            description: String::new(),
            required,
            timeout,
        }
    }

    #[test]
    fn test_successful_hooks_run_in_order() {
        let hooks = vec![hook("true", true, 30), hook("true", false, 30)];
        assert!(run_hooks(HookPhase::PreConnect, &hooks).is_ok());
    }

    #[test]
    fn test_required_hook_failure_aborts() {
        let hooks = vec![hook("echo boom >&2; exit 3", true, 30)];
        let err = run_hooks(HookPhase::PreConnect, &hooks).unwrap_err();
        match err {
            Error::HookFailed { name, reason } => {
                assert_eq!(name, "test-hook");
                assert!(reason.contains("boom"), "reason was: {reason}");
            }
            other => panic!("expected HookFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_hook_failure_is_ignored() {
        let hooks = vec![hook("exit 1", false, 30), hook("true", true, 30)];
        assert!(run_hooks(HookPhase::PostConnect, &hooks).is_ok());
    }

    #[test]
    fn test_hook_flooding_stderr_still_succeeds() {
        // Writes far more than a pipe buffer holds; the hook must still exit
        // zero well inside its deadline instead of wedging on a full pipe.
        let hooks = vec![hook("head -c 200000 /dev/zero >&2; exit 0", true, 5)];
        let start = Instant::now();
        assert!(run_hooks(HookPhase::PreConnect, &hooks).is_ok());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_hook_flooding_stderr_failure_still_reported() {
        let hooks = vec![hook("head -c 200000 /dev/zero >&2; exit 3", true, 5)];
        let err = run_hooks(HookPhase::PostConnect, &hooks).unwrap_err();
        match err {
            Error::HookFailed { reason, .. } => {
                assert!(reason.contains("exited with"))
            }
            other => panic!("expected HookFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_hook_timeout_kills_the_command() {
        let hooks = vec![hook("sleep 10", true, 1)];
        let start = Instant::now();
        let err = run_hooks(HookPhase::PreDisconnect, &hooks).unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        match err {
            Error::HookFailed { reason, .. } => {
                assert!(reason.contains("timed out"), "reason was: {reason}")
            }
            other => panic!("expected HookFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_phase_hooks_are_a_noop() {
        assert!(run_hooks(HookPhase::PostDisconnect, &[]).is_ok());
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(HookPhase::PreConnect.to_string(), "pre-connect");
        assert_eq!(HookPhase::PostDisconnect.to_string(), "post-disconnect");
    }
}
