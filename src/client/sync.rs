//! Long-poll sync loop.
//!
//! Each iteration issues a cheap check against the selected push host and
//! decides from its `(retcode, selector)` pair whether to pull a full sync.
//! A full sync always replaces the cursor before the next check goes out.

use std::thread;

use chrono::Utc;
use log::{debug, info, warn};

use super::Client;
use crate::error::{Error, Result};
use crate::protocol::decode::parse_sync_check;
use crate::protocol::message::{parse_message, MediaContext};
use crate::protocol::request::SyncRequest;
use crate::protocol::response::{decode, SyncResponse};
use crate::protocol::SyncCheck;
use crate::transport::Transport;
use crate::types::SyncUpdate;

/// Cookie whose value is invalidated once after the host probe.
const LOAD_TIME_COOKIE: &str = "wxloadtime";

/// What the loop does with one check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// The account ended the session elsewhere.
    Logout,
    /// New messages or contact changes: sync and forward the result.
    SyncAndDispatch,
    /// Nothing new: sleep.
    Idle,
    /// Unrecognised selector: sync to keep the cursor current, then sleep.
    SyncDefensively,
    /// Any other retcode, including the unreadable sentinel: check again.
    Retry,
}

/// Map a check result to the loop's next action.
pub fn classify(check: &SyncCheck) -> SyncAction {
    match (check.retcode.as_str(), check.selector.as_str()) {
        ("1100" | "1101", _) => SyncAction::Logout,
        ("0", "2" | "6") => SyncAction::SyncAndDispatch,
        ("0", "0") => SyncAction::Idle,
        ("0", _) => SyncAction::SyncDefensively,
        _ => SyncAction::Retry,
    }
}

impl<T: Transport> Client<T> {
    fn pause(&self) {
        thread::sleep(self.config.sync_interval());
    }

    /// Serve the session until it ends remotely or the engine is disabled.
    /// Every other failure is logged and retried.
    pub(super) fn run_sync_loop(&self) -> Result<()> {
        loop {
            if !self.lifecycle.is_enabled() {
                info!("engine disabled, leaving sync loop");
                return Ok(());
            }

            let check = match self.sync_check() {
                Ok(check) => check,
                Err(e) if e.is_transient() => {
                    warn!("sync check failed: {}", e);
                    self.pause();
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!("synccheck retcode {} selector {}", check.retcode, check.selector);

            match classify(&check) {
                SyncAction::Logout => {
                    info!("session ended remotely, retcode {}", check.retcode);
                    self.notify_logout();
                    return Err(Error::SessionEnded {
                        retcode: check.retcode,
                    });
                }
                SyncAction::SyncAndDispatch => match self.webwx_sync() {
                    Ok(update) if !update.is_empty() => self.handler.on_message(&update),
                    Ok(_) => {}
                    Err(e) => {
                        warn!("webwxsync failed: {}", e);
                        self.pause();
                    }
                },
                SyncAction::Idle => self.pause(),
                SyncAction::SyncDefensively => {
                    if let Err(e) = self.webwx_sync() {
                        warn!("webwxsync failed: {}", e);
                    }
                    self.pause();
                }
                SyncAction::Retry => {}
            }
        }
    }

    /// Try each configured push host until one answers with retcode `0`.
    pub(super) fn probe_sync_host(&self) -> Result<()> {
        for host in &self.config.sync_hosts {
            self.write_session().sync_host = host.clone();
            match self.sync_check() {
                Ok(check) if check.retcode == "0" => {
                    self.write_session().mark_host_verified();
                    info!("using sync host {}", host);
                    return Ok(());
                }
                Ok(check) => debug!("sync host {} answered retcode {}", host, check.retcode),
                Err(e) => debug!("sync host {} unreachable: {}", host, e),
            }
        }
        Err(Error::NoSyncHost)
    }

    /// One check call. Unreadable bodies come back as [`SyncCheck::unknown`].
    pub(super) fn sync_check(&self) -> Result<SyncCheck> {
        if self.write_session().take_cookie_rotation() {
            self.expire_load_time_cookie();
        }
        let url = self.read_session().sync_check_url();
        let body = self.transport.get(&url)?;
        Ok(parse_sync_check(&body))
    }

    fn expire_load_time_cookie(&self) {
        if let Some(value) = self.transport.cookie(LOAD_TIME_COOKIE) {
            let expired = format!("{value}_expired");
            debug!("{} cookie set to {}", LOAD_TIME_COOKIE, expired);
            self.transport.set_cookie(LOAD_TIME_COOKIE, &expired);
        }
    }

    /// Full sync: replace the cursor, revise the directory and decode the
    /// new messages.
    pub(super) fn webwx_sync(&self) -> Result<SyncUpdate> {
        let (url, request, base_uri, skey) = {
            let session = self.read_session();
            let request = SyncRequest {
                base_request: session.base_request(),
                sync_key: session.sync_key().clone(),
                rr: !Utc::now().timestamp(),
            };
            (
                session.sync_url(&self.config.lang),
                request,
                session.base_uri.clone(),
                session.skey.clone(),
            )
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        let response: SyncResponse = decode("webwxsync", &body)?;

        if !self.write_session().replace_sync_key(response.sync_key.clone()) {
            warn!("webwxsync returned an empty sync key, keeping the current one");
        }

        let mut update = self.revise_directory(&response);
        let media = MediaContext {
            base_uri: &base_uri,
            skey: &skey,
        };
        update.messages = response
            .add_msg_list
            .iter()
            .map(|raw| parse_message(raw, media))
            .collect();
        debug!(
            "webwxsync: {} messages, {} modified, {} deleted",
            update.messages.len(),
            update.modified.len(),
            update.deleted.len()
        );
        Ok(update)
    }

    /// Apply `ModContactList` and `DelContactList` to the directory.
    fn revise_directory(&self, response: &SyncResponse) -> SyncUpdate {
        let mut update = SyncUpdate {
            new_friends: self.merge_contacts(&response.mod_contact_list),
            modified: response
                .mod_contact_list
                .iter()
                .map(|raw| raw.user_name.clone())
                .collect(),
            ..Default::default()
        };
        {
            let mut directory = self.write_directory();
            for raw in &response.del_contact_list {
                if directory.remove(&raw.user_name) {
                    update.deleted.push(raw.user_name.clone());
                }
            }
        }
        self.report_discovered(&update.new_friends);
        update
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, sync_reply};
    use super::*;

    fn check(retcode: &str, selector: &str) -> String {
        format!(r#"window.synccheck={{retcode:"{retcode}",selector:"{selector}"}}"#)
    }

    fn online(dir: &std::path::Path) -> (
        Client<crate::transport::mock::MockTransport>,
        std::sync::Arc<crate::handler::recording::RecordingHandler>,
    ) {
        let (client, handler) = testing::established(dir);
        client.lifecycle.begin().unwrap();
        client.lifecycle.mark_online();
        (client, handler)
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(&SyncCheck::new("1100", "0")), SyncAction::Logout);
        assert_eq!(classify(&SyncCheck::new("1101", "2")), SyncAction::Logout);
        assert_eq!(classify(&SyncCheck::new("0", "2")), SyncAction::SyncAndDispatch);
        assert_eq!(classify(&SyncCheck::new("0", "6")), SyncAction::SyncAndDispatch);
        assert_eq!(classify(&SyncCheck::new("0", "0")), SyncAction::Idle);
        assert_eq!(classify(&SyncCheck::new("0", "7")), SyncAction::SyncDefensively);
        assert_eq!(classify(&SyncCheck::unknown()), SyncAction::Retry);
    }

    #[test]
    fn test_remote_logout_ends_loop_once() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client.transport().on("synccheck", &check("1100", "0"));

        let err = client.run_sync_loop().unwrap_err();
        assert!(matches!(err, Error::SessionEnded { ref retcode } if retcode == "1100"));
        assert_eq!(client.transport().count("webwxsync"), 0);

        client.notify_logout();
        assert_eq!(*handler.logouts.lock().unwrap(), vec!["uuid-1"]);
    }

    #[test]
    fn test_new_message_is_synced_and_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        let transport = client.transport();
        transport
            .on("synccheck", &check("0", "2"))
            .on("synccheck", &check("1100", "0"))
            .on("webwxsync", &sync_reply(r#"[{"MsgId":"100","FromUserName":"@friend","ToUserName":"@me","MsgType":1,"Content":"hello","CreateTime":1500000000}]"#, "[]", "[]"));

        let _ = client.run_sync_loop();

        let updates = handler.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].messages[0].content, "hello");

        // The cursor sent with the sync is the old one; the next check
        // carries the replacement.
        let sync = &transport.requests_to("webwxsync")[0];
        assert!(sync.body.contains(r#""SyncKey":{"Count":1,"List":[{"Key":1,"Val":1}]}"#));
        let checks = transport.requests_to("synccheck");
        assert!(checks[1].url.contains("synckey=1_11%7C2_21"));
        assert_eq!(client.session().sync_key_str(), "1_11|2_21");
    }

    #[test]
    fn test_idle_selector_skips_sync() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client
            .transport()
            .on("synccheck", &check("0", "0"))
            .on("synccheck", &check("0", "0"))
            .on("synccheck", &check("1101", "0"));

        let _ = client.run_sync_loop();
        assert_eq!(client.transport().count("synccheck"), 3);
        assert_eq!(client.transport().count("webwxsync"), 0);
        assert!(handler.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_check_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client
            .transport()
            .on("synccheck", "")
            .on("synccheck", "<html>gateway timeout</html>")
            .fail("synccheck", "connection reset")
            .on("synccheck", &check("1100", "0"));

        let err = client.run_sync_loop().unwrap_err();
        assert!(matches!(err, Error::SessionEnded { .. }));
        assert_eq!(client.transport().count("synccheck"), 4);
        assert_eq!(handler.logouts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_other_selector_syncs_without_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client
            .transport()
            .on("synccheck", &check("0", "4"))
            .on("synccheck", &check("1100", "0"))
            .on("webwxsync", &sync_reply(r#"[{"MsgId":"1","MsgType":51}]"#, "[]", "[]"));

        let _ = client.run_sync_loop();
        assert_eq!(client.transport().count("webwxsync"), 1);
        assert!(handler.updates.lock().unwrap().is_empty());
        assert_eq!(client.session().sync_key_str(), "1_11|2_21");
    }

    #[test]
    fn test_rejected_sync_keeps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client
            .transport()
            .on("synccheck", &check("0", "2"))
            .on("synccheck", &check("1100", "0"))
            .on("webwxsync", r#"{"BaseResponse":{"Ret":1,"ErrMsg":""},"SyncKey":{"Count":1,"List":[{"Key":1,"Val":99}]}}"#);

        let _ = client.run_sync_loop();
        assert_eq!(client.session().sync_key_str(), "1_1");
        assert!(handler.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_loop_exits_without_polling() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client.run_sync_loop().unwrap();
        assert_eq!(client.transport().count("synccheck"), 0);
    }

    #[test]
    fn test_probe_adopts_first_working_host() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client
            .transport()
            .on("push1.example", &check("1102", "0"))
            .on("push2.example", &check("0", "0"));

        client.probe_sync_host().unwrap();
        assert_eq!(client.session().sync_host, "push2.example");
    }

    #[test]
    fn test_probe_without_working_host() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client
            .transport()
            .fail("push1.example", "unreachable")
            .on("push2.example", "");

        assert!(matches!(client.probe_sync_host(), Err(Error::NoSyncHost)));
    }

    #[test]
    fn test_load_time_cookie_expired_once() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        let transport = client.transport();
        transport.set_cookie(LOAD_TIME_COOKIE, "1500000000");
        transport.on("synccheck", &check("0", "0"));

        client.probe_sync_host().unwrap();
        assert_eq!(transport.cookie(LOAD_TIME_COOKIE).as_deref(), Some("1500000000"));

        client.sync_check().unwrap();
        client.sync_check().unwrap();
        assert_eq!(
            transport.cookie(LOAD_TIME_COOKIE).as_deref(),
            Some("1500000000_expired")
        );
    }

    #[test]
    fn test_sync_revises_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = online(dir.path());
        client.write_directory().insert_friend(
            &crate::protocol::response::RawContact {
                user_name: "@gone".into(),
                nick_name: "gone".into(),
                ..Default::default()
            },
            1,
        );
        client.transport().on(
            "webwxsync",
            &sync_reply(
                "[]",
                r#"[{"UserName":"@new","NickName":"newbie","ContactFlag":3},{"UserName":"@@room","NickName":"room","MemberList":[{"UserName":"@new","NickName":"newbie"}]}]"#,
                r#"[{"UserName":"@gone"}]"#,
            ),
        );

        let update = client.webwx_sync().unwrap();
        assert_eq!(update.modified, vec!["@new", "@@room"]);
        assert_eq!(update.deleted, vec!["@gone"]);
        assert_eq!(update.new_friends[0].user_name, "@new");

        assert!(client.friend_by_name("newbie").is_some());
        assert!(client.friend_by_name("gone").is_none());
        assert_eq!(client.group_by_name("room").unwrap().members.len(), 1);

        let discovered = handler.discovered.lock().unwrap();
        assert_eq!(discovered[0].0, "@me");
        assert_eq!(discovered[0].1.len(), 1);
    }
}
