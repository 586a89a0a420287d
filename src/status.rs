//! Connection status: what the state file claims vs what actually runs.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;
use crate::mux::{Backend, Multiplexer};
use crate::state::{LockedState, SessionRecord, State};

/// Liveness of one tracked profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected {
        session: String,
        since: DateTime<Utc>,
    },
    /// Tracked, but the session is gone: the VPN process died or was killed
    /// outside ovpnctl.
    Stale { session: String },
    /// Recorded under a different multiplexer than the configured one, so
    /// its liveness cannot be checked from here.
    Unknown { session: String, backend: Backend },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Connected { .. } => "connected",
            SessionState::Stale { .. } => "stale",
            SessionState::Unknown { .. } => "unknown",
        }
    }
}

/// Lazily cross-check every tracked record against the multiplexer, in
/// profile order.
///
/// Liveness-check failures are logged and shown as stale, and records
/// tracked under a different backend come back as unknown; this never
/// mutates the state file. Only [`reconcile`] drops records, and it
/// propagates liveness errors instead of guessing.
pub fn statuses<'a>(
    state: &'a State,
    mux: &'a dyn Multiplexer,
) -> impl Iterator<Item = (String, SessionState)> + 'a {
    state.sessions.values().map(move |rec| {
        if rec.backend != mux.backend() {
            let session_state = SessionState::Unknown {
                session: rec.session.clone(),
                backend: rec.backend,
            };
            return (rec.profile.clone(), session_state);
        }
        let live = match mux.has_session(&rec.session) {
            Ok(live) => live,
            Err(e) => {
                debug!(session = %rec.session, error = %e, "liveness probe failed");
                false
            }
        };
        let session_state = if live {
            SessionState::Connected {
                session: rec.session.clone(),
                since: rec.connected_at,
            }
        } else {
            SessionState::Stale {
                session: rec.session.clone(),
            }
        };
        (rec.profile.clone(), session_state)
    })
}

/// Drop every tracked record whose session no longer exists. Returns the
/// dropped records so the caller can tell the user about them.
///
/// Records tracked under a different backend are left alone: absence under
/// the configured multiplexer says nothing about them.
pub fn reconcile(locked: &mut LockedState, mux: &dyn Multiplexer) -> Result<Vec<SessionRecord>> {
    let mut stale = Vec::new();
    for rec in locked.state().sessions.values() {
        if rec.backend != mux.backend() {
            continue;
        }
        if !mux.has_session(&rec.session)? {
            stale.push(rec.clone());
        }
    }

    if !stale.is_empty() {
        for rec in &stale {
            warn!(profile = %rec.profile, session = %rec.session, "dropping stale session record");
        }
        locked.update(|s| {
            for rec in &stale {
                s.sessions.remove(&rec.profile);
            }
        })?;
    }

    Ok(stale)
}
