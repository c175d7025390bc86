//! QR login handshake and session bootstrap.

use std::sync::PoisonError;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};

use super::Client;
use crate::error::{Error, Result};
use crate::protocol::decode::{parse_auth_tokens, parse_login_status, parse_login_ticket};
use crate::protocol::request::{InitRequest, NotifyCode};
use crate::protocol::response::{decode, InitResponse};
use crate::protocol::{LoginStatus, QrTicket, RedirectTarget};
use crate::state::LoginPhase;
use crate::transport::Transport;
use crate::types::is_group;

impl<T: Transport> Client<T> {
    /// Run one named login step, logging how long it took or why it failed.
    fn step<R>(&self, name: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        info!("{} ...", name);
        let started = Instant::now();
        match f() {
            Ok(value) => {
                info!("{} ok, took {:.3}s", name, started.elapsed().as_secs_f64());
                Ok(value)
            }
            Err(e) => {
                error!("{} failed: {}", name, e);
                Err(e)
            }
        }
    }

    /// Every step from a fresh ticket up to an online session with a
    /// populated directory. Any failure abandons the attempt.
    pub(super) fn login(&self) -> Result<()> {
        let uuid = self.step("request login ticket", || self.request_login_ticket())?;
        let ticket = self.step("issue qrcode", || self.issue_qr(&uuid))?;
        info!("scan the qrcode to log in, uuid {}", uuid);
        self.handler.on_qr_code(&ticket);

        let target = self.step("wait for confirmation", || self.wait_for_login(&uuid))?;
        self.step("establish session", || self.establish_session(&target))?;
        self.step("initialize session", || self.initialize())?;
        self.notify_online();
        self.step("probe sync host", || self.probe_sync_host())?;
        self.step("fetch contacts", || self.sync_contacts())?;
        self.step("resolve groups", || self.resolve_groups())?;

        self.lifecycle.mark_online();
        self.handler.on_login(&uuid);
        Ok(())
    }

    fn request_login_ticket(&self) -> Result<String> {
        let url = format!(
            "https://{}/jslogin?appid={}&fun=new&lang={}&_={}",
            self.config.login_host,
            self.config.app_id,
            self.config.lang,
            Utc::now().timestamp_millis()
        );
        let body = self.transport.get(&url)?;
        let uuid = parse_login_ticket(&body)
            .ok_or_else(|| Error::protocol("jslogin", "login identifier not found"))?;
        self.write_session().uuid = uuid.clone();
        self.lifecycle.advance(LoginPhase::QrIssued)?;
        Ok(uuid)
    }

    fn issue_qr(&self, uuid: &str) -> Result<QrTicket> {
        let ticket = QrTicket::new(
            &self.config.login_host,
            uuid,
            Utc::now().timestamp_millis(),
            &self.config.qrcode_dir,
        );
        debug!("qrcode url {}", ticket.image_url);
        let image = self.transport.get_bytes(&ticket.image_url)?;
        ticket.persist(&image)?;
        *self.qr.lock().unwrap_or_else(PoisonError::into_inner) = Some(ticket.clone());
        self.lifecycle.advance(LoginPhase::PendingConfirmation)?;
        Ok(ticket)
    }

    /// Poll until the phone confirms. Unreadable or failed polls are simply
    /// repeated; only disabling the engine ends the wait early.
    pub(super) fn wait_for_login(&self, uuid: &str) -> Result<RedirectTarget> {
        let mut tip: u32 = 1;
        loop {
            if !self.lifecycle.is_enabled() {
                return Err(Error::Cancelled);
            }
            thread::sleep(self.config.login_poll_interval() * tip);

            let url = format!(
                "https://{}/cgi-bin/mmwebwx-bin/login?tip={}&uuid={}&_={}",
                self.config.login_host,
                tip,
                uuid,
                Utc::now().timestamp_millis()
            );
            let body = match self.transport.get(&url) {
                Ok(body) => body,
                Err(e) => {
                    debug!("login poll failed, retrying: {}", e);
                    continue;
                }
            };

            match parse_login_status(&body) {
                Some(LoginStatus::Scanned) => {
                    if tip == 1 {
                        info!("qrcode scanned, confirm the login on the phone");
                    }
                    tip = 0;
                }
                Some(LoginStatus::Confirmed(target)) => {
                    debug!("webwx base uri {}", target.base_uri);
                    self.lifecycle.advance(LoginPhase::Confirmed)?;
                    return Ok(target);
                }
                Some(LoginStatus::Timeout) => {
                    warn!("uuid {} login timed out", uuid);
                    tip = 1;
                }
                Some(LoginStatus::Abnormal(code)) => {
                    warn!("uuid {} login abnormal, code {}", uuid, code);
                }
                None => debug!("unreadable login poll response, retrying"),
            }
        }
    }

    fn establish_session(&self, target: &RedirectTarget) -> Result<()> {
        let body = self.transport.get(&target.redirect_uri)?;
        let tokens = parse_auth_tokens(&body)?;
        {
            let mut session = self.write_session();
            session.apply_redirect(target);
            session.apply_tokens(&tokens);
        }
        self.lifecycle.advance(LoginPhase::SessionEstablished)
    }

    /// Bootstrap: profile, first sync cursor and the recent group chats.
    fn initialize(&self) -> Result<()> {
        let (url, request) = {
            let session = self.read_session();
            let request = InitRequest {
                base_request: session.base_request(),
            };
            (session.init_url(), request)
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        let response: InitResponse = decode("webwxinit", &body)?;

        {
            let mut session = self.write_session();
            session.apply_profile(&response.user);
            if !session.replace_sync_key(response.sync_key) {
                return Err(Error::protocol("webwxinit", "empty sync key"));
            }
        }

        let mut directory = self.write_directory();
        for user_name in response.chat_set.split(',').filter(|name| is_group(name)) {
            directory.seed_group(user_name);
        }
        debug!("webwxinit seeded {} groups", directory.group_count());
        Ok(())
    }

    fn notify_online(&self) {
        if let Err(e) = self.status_notify(NotifyCode::Online, None) {
            warn!("online status notify failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, script_handshake, script_login};
    use crate::error::Error;
    use crate::state::{LoginPhase, Presence};

    #[test]
    fn test_login_establishes_session() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = testing::client(dir.path());
        script_login(client.transport());

        client.lifecycle.begin().unwrap();
        client.login().unwrap();

        let status = client.status();
        assert_eq!(status.phase, LoginPhase::SessionEstablished);
        assert_eq!(status.presence, Presence::Online);
        assert_eq!(*handler.logins.lock().unwrap(), vec!["uuid-1"]);

        let session = client.session();
        assert_eq!(session.sid, "sid");
        assert_eq!(session.uin, "42");
        assert_eq!(session.user_name, "@me");
        assert_eq!(session.base_host, "wx.example");
        assert_eq!(session.sync_host, "push1.example");
        assert_eq!(session.sync_key_str(), "1_10|2_20");

        let ticket = client.qr_ticket().unwrap();
        assert!(ticket.path.exists());
        assert!(client.group_by_name("family").is_some());
        assert!(client.friend_by_name("ann").is_some());
        assert_eq!(client.transport().count("webwxstatusnotify"), 1);
    }

    #[test]
    fn test_missing_ticket_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::client(dir.path());
        client.transport().on("jslogin", "window.QRLogin.code = 500;");

        client.lifecycle.begin().unwrap();
        let err = client.login().unwrap_err();
        assert!(matches!(err, Error::Protocol { endpoint: "jslogin", .. }));
        assert_eq!(client.status().phase, LoginPhase::Unauthenticated);
        assert_eq!(client.transport().count("/qrcode/"), 0);
    }

    #[test]
    fn test_poll_retries_until_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::client(dir.path());
        let transport = client.transport();
        transport
            .fail("mmwebwx-bin/login?", "connection reset")
            .on("mmwebwx-bin/login?", "")
            .on("mmwebwx-bin/login?", "window.code=408;")
            .on("mmwebwx-bin/login?", "window.code=201;")
            .on("mmwebwx-bin/login?", "window.code=400;")
            .on("mmwebwx-bin/login?", testing::CONFIRMED);

        client.lifecycle.begin().unwrap();
        client.lifecycle.advance(LoginPhase::QrIssued).unwrap();
        client.lifecycle.advance(LoginPhase::PendingConfirmation).unwrap();
        let target = client.wait_for_login("uuid-1").unwrap();

        assert_eq!(target.base_uri, testing::BASE_URI);
        let polls = transport.requests_to("mmwebwx-bin/login?");
        assert_eq!(polls.len(), 6);
        assert!(polls.iter().all(|poll| poll.method == "GET"));
        assert!(polls[0].url.contains("tip=1"));
        assert!(polls[4].url.contains("tip=0"));
        assert_eq!(client.status().phase, LoginPhase::Confirmed);
    }

    #[test]
    fn test_wait_cancelled_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::client(dir.path());
        let err = client.wait_for_login("uuid-1").unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(client.transport().count("mmwebwx-bin/login?"), 0);
    }

    #[test]
    fn test_rejected_redirect_has_no_partial_session() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::client(dir.path());
        script_handshake(client.transport());
        client.transport().on(
            "webwxnewloginpage",
            "<error><ret>1203</ret><message>denied</message></error>",
        );

        client.lifecycle.begin().unwrap();
        let err = client.login().unwrap_err();

        assert!(matches!(err, Error::Rejected { ret: 1203, .. }));
        assert_eq!(client.status().phase, LoginPhase::Confirmed);
        assert!(client.session().sid.is_empty());
        assert_eq!(client.transport().count("webwxinit"), 0);
    }

    #[test]
    fn test_init_rejection_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (client, handler) = testing::client(dir.path());
        script_handshake(client.transport());
        client
            .transport()
            .on("webwxnewloginpage", testing::TOKENS)
            .on("webwxinit", r#"{"BaseResponse":{"Ret":1,"ErrMsg":""}}"#);

        client.lifecycle.begin().unwrap();
        let err = client.login().unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                endpoint: "webwxinit",
                ret: 1
            }
        ));
        assert!(handler.logins.lock().unwrap().is_empty());
        assert_eq!(client.transport().count("synccheck"), 0);
    }
}
