//! Session tokens, routing and the rolling sync cursor.
//!
//! A [`Session`] starts empty and is filled field by field as the login
//! handshake advances. The sync cursor is only ever replaced as a whole.

use chrono::Utc;
use rand::Rng;

use crate::protocol::decode::{AuthTokens, RedirectTarget};
use crate::protocol::request::BaseRequest;
use crate::protocol::response::{SyncKey, UserProfile};

/// Authentication state for one running engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub uuid: String,
    pub redirect_uri: String,
    pub base_uri: String,
    pub base_host: String,
    pub uin: String,
    pub sid: String,
    pub skey: String,
    pub pass_ticket: String,
    /// Random, generated once per session.
    pub device_id: String,
    pub sync_host: String,
    pub nick_name: String,
    pub user_name: String,
    sync_key: SyncKey,
    sync_key_str: String,
    media_count: i64,
    host_verified: bool,
    cookie_rotated: bool,
}

/// `e` followed by fifteen random digits.
pub fn generate_device_id() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..15)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("e{digits}")
}

fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Session {
    pub fn new() -> Self {
        Self {
            device_id: generate_device_id(),
            media_count: -1,
            ..Default::default()
        }
    }

    /// Whether the redirect tokens have been applied.
    pub fn is_established(&self) -> bool {
        !self.sid.is_empty() && !self.skey.is_empty()
    }

    pub fn apply_redirect(&mut self, target: &RedirectTarget) {
        self.redirect_uri = target.redirect_uri.clone();
        self.base_uri = target.base_uri.clone();
        self.base_host = target.base_host.clone();
    }

    pub fn apply_tokens(&mut self, tokens: &AuthTokens) {
        self.skey = tokens.skey.clone();
        self.sid = tokens.wxsid.clone();
        self.uin = tokens.wxuin.clone();
        self.pass_ticket = tokens.pass_ticket.clone();
    }

    pub fn apply_profile(&mut self, profile: &UserProfile) {
        self.nick_name = profile.nick_name.clone();
        self.user_name = profile.user_name.clone();
    }

    /// Identity block for a request, built from the current tokens.
    pub fn base_request(&self) -> BaseRequest {
        BaseRequest {
            uin: self.uin.parse().unwrap_or(0),
            sid: self.sid.clone(),
            skey: self.skey.clone(),
            device_id: self.device_id.clone(),
        }
    }

    pub fn sync_key(&self) -> &SyncKey {
        &self.sync_key
    }

    /// The cursor serialized for query strings.
    pub fn sync_key_str(&self) -> &str {
        &self.sync_key_str
    }

    /// Replace the cursor wholesale. Empty cursors are ignored so a malformed
    /// response cannot wipe a working one; returns whether it was applied.
    pub fn replace_sync_key(&mut self, key: SyncKey) -> bool {
        if key.is_empty() {
            return false;
        }
        self.sync_key_str = key.to_query_value();
        self.sync_key = key;
        true
    }

    /// Next upload sequence number; the first call yields 0.
    pub fn next_media_index(&mut self) -> i64 {
        self.media_count += 1;
        self.media_count
    }

    /// Record a successful sync host probe.
    pub fn mark_host_verified(&mut self) {
        self.host_verified = true;
    }

    /// `true` exactly once: on the first call after the host probe succeeded.
    pub fn take_cookie_rotation(&mut self) -> bool {
        if self.host_verified && !self.cookie_rotated {
            self.cookie_rotated = true;
            return true;
        }
        false
    }

    pub fn init_url(&self) -> String {
        format!(
            "{}/webwxinit?pass_ticket={}&skey={}&r={}",
            self.base_uri,
            self.pass_ticket,
            self.skey,
            unix_millis()
        )
    }

    pub fn status_notify_url(&self, lang: &str) -> String {
        format!(
            "{}/webwxstatusnotify?lang={}&pass_ticket={}",
            self.base_uri, lang, self.pass_ticket
        )
    }

    pub fn contact_url(&self, lang: &str, seq: i64) -> String {
        format!(
            "{}/webwxgetcontact?lang={}&pass_ticket={}&seq={}&skey={}&r={}",
            self.base_uri,
            lang,
            self.pass_ticket,
            seq,
            self.skey,
            unix_millis()
        )
    }

    pub fn batch_contact_url(&self, lang: &str) -> String {
        format!(
            "{}/webwxbatchgetcontact?type=ex&lang={}&pass_ticket={}&r={}",
            self.base_uri,
            lang,
            self.pass_ticket,
            unix_millis()
        )
    }

    pub fn sync_check_url(&self) -> String {
        let now = unix_millis().to_string();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("r", &now)
            .append_pair("sid", &self.sid)
            .append_pair("uin", &self.uin)
            .append_pair("skey", &self.skey)
            .append_pair("deviceid", &self.device_id)
            .append_pair("synckey", &self.sync_key_str)
            .append_pair("_", &now)
            .finish();
        format!(
            "https://{}/cgi-bin/mmwebwx-bin/synccheck?{}",
            self.sync_host, query
        )
    }

    pub fn sync_url(&self, lang: &str) -> String {
        format!(
            "{}/webwxsync?sid={}&skey={}&lang={}&pass_ticket={}",
            self.base_uri, self.sid, self.skey, lang, self.pass_ticket
        )
    }

    pub fn send_msg_url(&self) -> String {
        format!("{}/webwxsendmsg?pass_ticket={}", self.base_uri, self.pass_ticket)
    }

    pub fn send_image_url(&self, lang: &str) -> String {
        format!(
            "{}/webwxsendmsgimg?fun=async&f=json&lang={}&pass_ticket={}",
            self.base_uri, lang, self.pass_ticket
        )
    }

    /// Primary and fallback media upload endpoints.
    pub fn upload_urls(&self) -> [String; 2] {
        ["file", "file2"].map(|prefix| {
            format!(
                "https://{}.{}/cgi-bin/mmwebwx-bin/webwxuploadmedia?f=json",
                prefix, self.base_host
            )
        })
    }

    pub fn oplog_url(&self) -> String {
        format!("{}/webwxoplog", self.base_uri)
    }

    pub fn verify_user_url(&self, lang: &str) -> String {
        format!(
            "{}/webwxverifyuser?r={}&lang={}&pass_ticket={}",
            self.base_uri,
            unix_millis(),
            lang,
            self.pass_ticket
        )
    }

    pub fn invite_member_url(&self) -> String {
        format!(
            "{}/webwxupdatechatroom?fun=invitemember&pass_ticket={}",
            self.base_uri, self.pass_ticket
        )
    }
}
