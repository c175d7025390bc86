//! The session engine.
//!
//! A [`Client`] drives one session end to end: the QR login handshake, the
//! long-poll sync loop and the contact directory. It is meant to be shared
//! through an [`Arc`] so background workers can send messages and read the
//! directory while [`Client::run`] owns the sync loop.
//!
//! Locking: the session tokens and the directory each sit behind their own
//! `RwLock`. No lock is ever held across a network call; callers snapshot
//! what they need, release, call out, then write back.

mod contacts;
mod login;
mod send;
mod sync;

pub use send::VerifyOpcode;
pub use sync::{classify, SyncAction};

use std::sync::{
    Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::config::WebwxConfig;
use crate::directory::ContactDirectory;
use crate::error::Result;
use crate::handler::SessionHandler;
use crate::protocol::QrTicket;
use crate::session::Session;
use crate::state::{Lifecycle, StatusSnapshot};
use crate::transport::Transport;
use crate::types::{Friend, Group};

/// One running session against the remote service.
pub struct Client<T: Transport> {
    config: WebwxConfig,
    transport: T,
    handler: Arc<dyn SessionHandler>,
    lifecycle: Lifecycle,
    session: RwLock<Session>,
    directory: RwLock<ContactDirectory>,
    qr: Mutex<Option<QrTicket>>,
}

impl<T: Transport> Client<T> {
    pub fn new(config: WebwxConfig, transport: T, handler: Arc<dyn SessionHandler>) -> Self {
        Self {
            config,
            transport,
            handler,
            lifecycle: Lifecycle::new(),
            session: RwLock::new(Session::new()),
            directory: RwLock::new(ContactDirectory::new()),
            qr: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WebwxConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> StatusSnapshot {
        self.lifecycle.snapshot()
    }

    /// Copy of the current session record.
    pub fn session(&self) -> Session {
        self.read_session().clone()
    }

    /// The QR code issued for this run, until it is removed.
    pub fn qr_ticket(&self) -> Option<QrTicket> {
        self.qr.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn friend_by_name(&self, name: &str) -> Option<Friend> {
        self.read_directory().friend_by_name(name).cloned()
    }

    pub fn group_by_name(&self, name: &str) -> Option<Group> {
        self.read_directory().group_by_name(name).cloned()
    }

    pub fn personal_friends(&self) -> Vec<Friend> {
        self.read_directory().personal_friends()
    }

    /// Run `f` against the directory under its read lock.
    pub fn with_directory<R>(&self, f: impl FnOnce(&ContactDirectory) -> R) -> R {
        f(&self.read_directory())
    }

    /// Log in and serve the sync loop until the session ends or the engine is
    /// stopped. Blocks the calling thread.
    ///
    /// Every run starts from a fresh session and directory, so a failed login
    /// can simply be retried. Once [`Client::stop`] was called, `run` returns
    /// [`Cancelled`](crate::Error::Cancelled) without touching the network.
    pub fn run(&self) -> Result<()> {
        self.lifecycle.begin()?;
        self.reset();
        let result = self.login().and_then(|()| self.run_sync_loop());
        if let Err(e) = &result {
            error!("engine stopped: {}", e);
        }
        self.notify_logout();
        self.lifecycle.finish();
        result
    }

    /// [`Client::run`] on a dedicated thread.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<()>>
    where
        T: 'static,
    {
        let client = Arc::clone(self);
        thread::spawn(move || client.run())
    }

    /// Disable the engine, wait for the loop to wind down, then remove the QR
    /// code. In-flight requests are not interrupted.
    ///
    /// The stop is permanent: a run that has not begun yet, or any later
    /// call to [`Client::run`], returns without logging in.
    pub fn stop(&self) {
        self.lifecycle.disable();
        if self.lifecycle.snapshot().started_at.is_some() {
            self.lifecycle.wait_finished();
        }
        self.remove_qr();
    }

    fn reset(&self) {
        *self.write_session() = Session::new();
        *self.write_directory() = ContactDirectory::new();
        self.remove_qr();
    }

    fn remove_qr(&self) {
        let ticket = self
            .qr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticket) = ticket {
            if let Err(e) = ticket.remove() {
                warn!("remove qrcode {} failed: {}", ticket.path.display(), e);
            }
        }
    }

    /// Fire the logout callback if this run was logged in and has not
    /// reported the logout yet.
    fn notify_logout(&self) {
        if self.lifecycle.mark_logged_out() {
            let uuid = self.read_session().uuid.clone();
            info!("session {} logged out", uuid);
            self.handler.on_logout(&uuid);
        }
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_directory(&self) -> RwLockReadGuard<'_, ContactDirectory> {
        self.directory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_directory(&self) -> RwLockWriteGuard<'_, ContactDirectory> {
        self.directory.write().unwrap_or_else(PoisonError::into_inner)
    }
}
