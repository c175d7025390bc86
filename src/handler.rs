//! Callbacks exposed to the embedding application.

use crate::protocol::QrTicket;
use crate::types::{Friend, SyncUpdate};

/// Receives engine events.
///
/// Every callback runs synchronously on the sync loop or the directory
/// resolution path, so implementations must return promptly.
pub trait SessionHandler: Send + Sync {
    /// A login QR code was written and is waiting to be scanned.
    fn on_qr_code(&self, _ticket: &QrTicket) {}

    /// The session was established; `uuid` is the login identifier.
    fn on_login(&self, uuid: &str);

    /// The session ended. Called at most once per engine run.
    fn on_logout(&self, uuid: &str);

    /// A full sync delivered new messages.
    fn on_message(&self, update: &SyncUpdate);

    /// Personal friends seen for the first time, owned by `owner`.
    fn on_friends_discovered(&self, _owner: &str, _friends: &[Friend]) {}
}

/// Handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl SessionHandler for NoopHandler {
    fn on_login(&self, _uuid: &str) {}

    fn on_logout(&self, _uuid: &str) {}

    fn on_message(&self, _update: &SyncUpdate) {}
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    /// Handler that records every callback, for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHandler {
        pub logins: Mutex<Vec<String>>,
        pub logouts: Mutex<Vec<String>>,
        pub updates: Mutex<Vec<SyncUpdate>>,
        pub discovered: Mutex<Vec<(String, Vec<Friend>)>>,
    }

    impl SessionHandler for RecordingHandler {
        fn on_login(&self, uuid: &str) {
            self.logins.lock().unwrap().push(uuid.to_string());
        }

        fn on_logout(&self, uuid: &str) {
            self.logouts.lock().unwrap().push(uuid.to_string());
        }

        fn on_message(&self, update: &SyncUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }

        fn on_friends_discovered(&self, owner: &str, friends: &[Friend]) {
            self.discovered
                .lock()
                .unwrap()
                .push((owner.to_string(), friends.to_vec()));
        }
    }
}
