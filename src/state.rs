//! Lifecycle state owned by one engine instance.
//!
//! The handshake phase, presence, the enabled flag and the completion marker
//! all live behind a single lock. Other workers only ever see
//! [`StatusSnapshot`] copies.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Login handshake phases, in the only order they may be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoginPhase {
    Unauthenticated,
    QrIssued,
    PendingConfirmation,
    Confirmed,
    SessionEstablished,
}

impl LoginPhase {
    /// The single phase reachable from this one.
    pub fn next(self) -> Option<LoginPhase> {
        match self {
            LoginPhase::Unauthenticated => Some(LoginPhase::QrIssued),
            LoginPhase::QrIssued => Some(LoginPhase::PendingConfirmation),
            LoginPhase::PendingConfirmation => Some(LoginPhase::Confirmed),
            LoginPhase::Confirmed => Some(LoginPhase::SessionEstablished),
            LoginPhase::SessionEstablished => None,
        }
    }
}

/// Whether the session is currently serving the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Presence {
    Offline,
    Online,
    LoggedOut,
}

/// Read-only copy of the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub phase: LoginPhase,
    pub presence: Presence,
    pub enabled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished: bool,
    /// Set by the first stop request and never cleared.
    pub stop_requested: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            phase: LoginPhase::Unauthenticated,
            presence: Presence::Offline,
            enabled: false,
            started_at: None,
            finished: false,
            stop_requested: false,
        }
    }
}

/// Coordinator for the engine lifecycle.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Mutex<StatusSnapshot>,
    finished: Condvar,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        *self.lock()
    }

    /// Start a run from a clean handshake and stamp the start time.
    ///
    /// Refused once a stop has been requested, or while another run is live.
    /// A refused stopped engine is marked finished so waiters wake up.
    pub fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if state.stop_requested {
            state.finished = true;
            self.finished.notify_all();
            return Err(Error::Cancelled);
        }
        if state.enabled {
            return Err(Error::AlreadyRunning);
        }
        *state = StatusSnapshot {
            enabled: true,
            started_at: Some(Utc::now()),
            ..StatusSnapshot::default()
        };
        Ok(())
    }

    /// Request cancellation; observed at the next loop boundary. Latches, so
    /// a run that has not begun yet is refused too.
    pub fn disable(&self) {
        let mut state = self.lock();
        state.enabled = false;
        state.stop_requested = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn phase(&self) -> LoginPhase {
        self.lock().phase
    }

    /// Move the handshake to `to`, which must be the direct successor.
    pub fn advance(&self, to: LoginPhase) -> Result<()> {
        let mut state = self.lock();
        if state.phase.next() != Some(to) {
            return Err(Error::InvalidTransition {
                from: state.phase,
                to,
            });
        }
        state.phase = to;
        Ok(())
    }

    pub fn mark_online(&self) {
        self.lock().presence = Presence::Online;
    }

    /// Flip an online session to `LoggedOut`. Returns `true` only for the
    /// call that performed the flip.
    pub fn mark_logged_out(&self) -> bool {
        let mut state = self.lock();
        if state.presence != Presence::Online {
            return false;
        }
        state.presence = Presence::LoggedOut;
        true
    }

    /// Signal the one-shot completion marker.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        state.enabled = false;
        self.finished.notify_all();
    }

    /// Block until [`Lifecycle::finish`] has been called.
    pub fn wait_finished(&self) {
        let mut state = self.lock();
        while !state.finished {
            state = self
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
