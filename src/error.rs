//! Error types for the session engine.

use thiserror::Error;

use crate::state::LoginPhase;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the login handshake, sync loop, directory and dispatch paths.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or HTTP-level failure.
    #[error("transport: {0}")]
    Transport(String),

    /// The response arrived but the expected field or pattern was missing.
    #[error("unexpected response from {endpoint}: {reason}")]
    Protocol {
        endpoint: &'static str,
        reason: String,
    },

    /// The remote service answered with a non-success return code.
    #[error("{endpoint} rejected with ret {ret}")]
    Rejected { endpoint: &'static str, ret: i64 },

    /// The account ended the session from elsewhere.
    #[error("session ended remotely (retcode {retcode})")]
    SessionEnded { retcode: String },

    #[error("no sync host answered the probe")]
    NoSyncHost,

    /// The engine was disabled while a step was waiting.
    #[error("engine disabled")]
    Cancelled,

    #[error("engine already running")]
    AlreadyRunning,

    #[error("invalid login transition from {from:?} to {to:?}")]
    InvalidTransition { from: LoginPhase, to: LoginPhase },

    #[error("not logged in")]
    NotLoggedIn,

    #[error("unknown contact: {0}")]
    UnknownContact(String),

    #[error("display name already taken: {0}")]
    NameTaken(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::DeError),
}

impl Error {
    /// Shorthand for a protocol-shape failure.
    pub fn protocol(endpoint: &'static str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            endpoint,
            reason: reason.into(),
        }
    }

    /// Whether the steady-state sync loop may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Protocol { .. }
                | Error::Rejected { .. }
                | Error::Json(_)
                | Error::Io(_)
        )
    }
}
