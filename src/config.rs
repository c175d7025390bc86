use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Push hosts probed, in order, for the sync check endpoint.
pub const DEFAULT_SYNC_HOSTS: [&str; 6] = [
    "webpush.weixin.qq.com",
    "webpush2.weixin.qq.com",
    "webpush.wechat.com",
    "webpush1.wechat.com",
    "webpush2.wechat.com",
    "webpush1.wechatapp.com",
];

/// Base configuration used by the session engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebwxConfig {
    /// Directory the login QR code image is written to.
    pub qrcode_dir: PathBuf,
    /// Application id sent with the login ticket request.
    pub app_id: String,
    /// Language tag sent on every endpoint that accepts one.
    pub lang: String,
    /// Host serving the login ticket, QR image and status poll.
    pub login_host: String,
    /// Identifier sent in the client user agent string.
    pub user_agent: String,
    /// Ordered candidate hosts for the sync check.
    pub sync_hosts: Vec<String>,
    /// Fixed pause between idle polls and after defensive syncs.
    pub sync_interval_ms: u64,
    /// One unit of the login status wait hint.
    pub login_poll_interval_ms: u64,
    /// Pause after pushing a remark rename to the server.
    pub rename_throttle_ms: u64,
    /// Read timeout for HTTP calls; must exceed the long-poll window.
    pub http_timeout_secs: u64,
}

impl Default for WebwxConfig {
    fn default() -> Self {
        Self {
            qrcode_dir: PathBuf::from("./data/qrcode"),
            app_id: "wx782c26e4c19acffb".into(),
            lang: "zh_CN".into(),
            login_host: "login.weixin.qq.com".into(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/54.0.2840.71 Safari/537.36".into(),
            sync_hosts: DEFAULT_SYNC_HOSTS.iter().map(|h| h.to_string()).collect(),
            sync_interval_ms: 1000,
            login_poll_interval_ms: 1000,
            rename_throttle_ms: 1000,
            http_timeout_secs: 40,
        }
    }
}

impl WebwxConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Override the QR code directory.
    pub fn with_qrcode_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.qrcode_dir = dir.into();
        self
    }

    /// Override the login host.
    pub fn with_login_host(mut self, host: impl Into<String>) -> Self {
        self.login_host = host.into();
        self
    }

    /// Override the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Replace the sync host probe list.
    pub fn with_sync_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sync_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_login_poll_interval(mut self, interval: Duration) -> Self {
        self.login_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_rename_throttle(mut self, throttle: Duration) -> Self {
        self.rename_throttle_ms = throttle.as_millis() as u64;
        self
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn login_poll_interval(&self) -> Duration {
        Duration::from_millis(self.login_poll_interval_ms)
    }

    pub fn rename_throttle(&self) -> Duration {
        Duration::from_millis(self.rename_throttle_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
