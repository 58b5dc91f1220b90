//! Readiness gate in front of the viewer proxy.
//!
//! The gate is tied to the session that is currently live. A settle timer
//! armed for session `n` may only open it while session `n` is still the
//! active one; once that session terminates the gate closes and any timer
//! still in flight for it becomes a no-op.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

/// Monotonic per-process session number handed out by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(pub u64);

impl SessionToken {
    /// The token following this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct GateState {
    active: Option<SessionToken>,
    open: bool,
}

/// Whether viewer traffic may be forwarded.
///
/// Starts closed with no active session.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `token` as the live session. The gate stays closed until a
    /// settle timer for `token` calls [`open_for`](Self::open_for).
    pub fn activate(&self, token: SessionToken) {
        let mut state = self.lock();
        state.active = Some(token);
        state.open = false;
        debug!(%token, "readiness gate bound to session");
    }

    /// Close the gate and forget the active session.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.open {
            info!("readiness gate closed");
        }
        state.open = false;
        state.active = None;
    }

    /// Open the gate if `token` is still the active session.
    ///
    /// Returns whether the gate is open for `token` afterwards.
    pub fn open_for(&self, token: SessionToken) -> bool {
        let mut state = self.lock();
        if state.active != Some(token) {
            debug!(%token, active = ?state.active, "ignoring stale readiness signal");
            return false;
        }
        if !state.open {
            state.open = true;
            info!(%token, "viewer ready");
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Token of the live session, if any.
    pub fn active(&self) -> Option<SessionToken> {
        self.lock().active
    }
}
