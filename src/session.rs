//! Connect and disconnect lifecycle.
//!
//! A connect runs pre-connect hooks, spawns OpenVPN inside a fresh
//! multiplexer session, records it in the state file, waits out the
//! configured startup delay, then runs post-connect hooks. Disconnect is the
//! mirror image. The state lock is held across the check-then-spawn window so
//! concurrent invocations cannot both conclude a profile is free.

use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::{Config, Profile};
use crate::error::{Error, Result};
use crate::hooks::{self, HookPhase};
use crate::mux::Multiplexer;
use crate::state::{LockedState, SessionRecord};
use crate::status;

/// Multiplexer session name for a profile: the configured template with the
/// sanitized profile id filled in.
pub fn session_name(config: &Config, profile: &Profile) -> String {
    let safe: String = profile
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    config.session.name_template.replace("{profile}", &safe)
}

/// Command line run inside the session.
fn openvpn_argv(config: &Config, profile: &Profile) -> Vec<String> {
    let mut argv = Vec::new();
    if config.openvpn.use_sudo {
        argv.push("sudo".to_string());
    }
    argv.push(config.openvpn.binary.clone());
    argv.push("--config".to_string());
    argv.push(profile.file.to_string_lossy().into_owned());
    argv
}

/// Bring up a VPN session for `profile`.
///
/// Without `force`, a live session for the same profile is
/// [`Error::AlreadyConnected`] and a live session elsewhere in a
/// single-connection location is [`Error::LocationBusy`]; with `force` the
/// conflicting sessions are killed first. Records tracked under a different
/// backend than the configured one cannot be reached at all and are
/// [`Error::BackendMismatch`], force or not.
pub fn connect(
    config: &Config,
    state_file: &Path,
    mux: &dyn Multiplexer,
    profile: &Profile,
    force: bool,
) -> Result<()> {
    if !profile.file.exists() {
        return Err(Error::ProfileFileMissing(profile.file.clone()));
    }

    let session = session_name(config, profile);
    let mut locked = LockedState::lock(state_file)?;

    if let Some(rec) = locked.state().sessions.get(&profile.id).cloned() {
        // A record spawned under another multiplexer can be neither checked
        // nor killed from here, so not even --force touches it.
        if rec.backend != mux.backend() {
            return Err(Error::BackendMismatch {
                profile: profile.id.clone(),
                record: rec.backend,
                configured: mux.backend(),
            });
        }
        if mux.has_session(&rec.session)? {
            if !force {
                return Err(Error::AlreadyConnected(profile.id.clone()));
            }
            info!(profile = %profile.id, session = %rec.session, "killing live session for reconnect");
            mux.kill_session(&rec.session)?;
        } else {
            warn!(profile = %profile.id, "dropping stale session record");
        }
        locked.update(|s| {
            s.sessions.remove(&profile.id);
        })?;
    }

    if !profile.allow_simultaneous {
        let mut active: Vec<SessionRecord> = Vec::new();
        for rec in locked.state().sessions.values() {
            if rec.profile.split('/').next() != Some(profile.location.as_str()) {
                continue;
            }
            // Unreachable records count as live; guessing the other way
            // could double-connect a single-connection location.
            let live = if rec.backend == mux.backend() {
                mux.has_session(&rec.session)?
            } else {
                true
            };
            if live {
                active.push(rec.clone());
            }
        }
        if !active.is_empty() {
            if !force {
                return Err(Error::LocationBusy {
                    location: profile.location.clone(),
                    active: active.iter().map(|r| r.profile.clone()).collect(),
                });
            }
            if let Some(other) = active.iter().find(|r| r.backend != mux.backend()) {
                return Err(Error::BackendMismatch {
                    profile: other.profile.clone(),
                    record: other.backend,
                    configured: mux.backend(),
                });
            }
            for rec in &active {
                info!(profile = %rec.profile, "killing session, location allows a single connection");
                mux.kill_session(&rec.session)?;
            }
            locked.update(|s| {
                for rec in &active {
                    s.sessions.remove(&rec.profile);
                }
            })?;
        }
    }

    hooks::run_hooks(HookPhase::PreConnect, config.hooks.set(HookPhase::PreConnect))?;

    mux.spawn(&session, &config.base_dir, &openvpn_argv(config, profile))?;
    info!(profile = %profile.id, session = %session, "VPN session started");

    locked.update(|s| {
        s.sessions.insert(
            profile.id.clone(),
            SessionRecord {
                profile: profile.id.clone(),
                session: session.clone(),
                backend: mux.backend(),
                connected_at: Utc::now(),
            },
        );
    })?;
    drop(locked);

    if config.session.startup_delay > 0 {
        info!(
            seconds = config.session.startup_delay,
            "waiting for the connection to settle"
        );
        thread::sleep(Duration::from_secs(config.session.startup_delay));
    }
    hooks::run_hooks(HookPhase::PostConnect, config.hooks.set(HookPhase::PostConnect))?;

    Ok(())
}

/// Tear down the tracked session for `profile`.
pub fn disconnect(
    config: &Config,
    state_file: &Path,
    mux: &dyn Multiplexer,
    profile: &Profile,
) -> Result<()> {
    let mut locked = LockedState::lock(state_file)?;
    let Some(rec) = locked.state().sessions.get(&profile.id).cloned() else {
        return Err(Error::NotConnected(profile.id.clone()));
    };

    if rec.backend != mux.backend() {
        return Err(Error::BackendMismatch {
            profile: profile.id.clone(),
            record: rec.backend,
            configured: mux.backend(),
        });
    }

    if !mux.has_session(&rec.session)? {
        warn!(profile = %profile.id, "session already gone, dropping stale record");
        locked.update(|s| {
            s.sessions.remove(&profile.id);
        })?;
        return Err(Error::NotConnected(profile.id.clone()));
    }

    hooks::run_hooks(
        HookPhase::PreDisconnect,
        config.hooks.set(HookPhase::PreDisconnect),
    )?;

    mux.kill_session(&rec.session)?;
    locked.update(|s| {
        s.sessions.remove(&profile.id);
    })?;
    drop(locked);
    info!(profile = %profile.id, session = %rec.session, "VPN session stopped");

    hooks::run_hooks(
        HookPhase::PostDisconnect,
        config.hooks.set(HookPhase::PostDisconnect),
    )?;
    Ok(())
}

/// Tear down every live tracked session; stale records are dropped along the
/// way and records under another multiplexer are left untouched. Disconnect
/// hooks run once around the whole batch, and nothing runs when there is
/// nothing to disconnect. Returns the profile ids actually disconnected.
pub fn disconnect_all(
    config: &Config,
    state_file: &Path,
    mux: &dyn Multiplexer,
) -> Result<Vec<String>> {
    let mut locked = LockedState::lock(state_file)?;
    status::reconcile(&mut locked, mux)?;

    let mut live: Vec<SessionRecord> = Vec::new();
    for rec in locked.state().sessions.values() {
        if rec.backend == mux.backend() {
            live.push(rec.clone());
        } else {
            warn!(profile = %rec.profile, backend = %rec.backend, "tracked under another multiplexer, leaving it");
        }
    }
    if live.is_empty() {
        return Ok(Vec::new());
    }

    hooks::run_hooks(
        HookPhase::PreDisconnect,
        config.hooks.set(HookPhase::PreDisconnect),
    )?;

    let mut done = Vec::new();
    for rec in &live {
        match mux.kill_session(&rec.session) {
            Ok(()) => {
                info!(profile = %rec.profile, session = %rec.session, "VPN session stopped");
                done.push(rec.profile.clone());
            }
            // Keep the record so a later disconnect can retry.
            Err(e) => warn!(profile = %rec.profile, error = %e, "failed to kill session"),
        }
    }
    locked.update(|s| {
        for profile in &done {
            s.sessions.remove(profile);
        }
    })?;
    drop(locked);

    hooks::run_hooks(
        HookPhase::PostDisconnect,
        config.hooks.set(HookPhase::PostDisconnect),
    )?;
    Ok(done)
}
