//! Decoders for the login and poll endpoints.
//!
//! These endpoints answer with JavaScript variable assignments (and one XML
//! fragment) rather than JSON. Everything here turns raw bodies into typed
//! values so the rest of the engine never touches the text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

lazy_static! {
    static ref QR_UUID_RE: Regex =
        Regex::new(r#"window\.QRLogin\.uuid\s*=\s*"([^"]+)""#).expect("valid uuid regex");
    static ref QUOTED_RE: Regex = Regex::new(r#""(\S+?)""#).expect("valid quoted regex");
    static ref LOGIN_CODE_RE: Regex = Regex::new(r"window\.code=(\d+);").expect("valid code regex");
    static ref REDIRECT_RE: Regex =
        Regex::new(r#"window\.redirect_uri="(\S+?)";"#).expect("valid redirect regex");
    static ref SYNC_CHECK_RE: Regex =
        Regex::new(r#"window\.synccheck=\{retcode:"(\d+)",selector:"(\d+)"\}"#)
            .expect("valid synccheck regex");
}

/// Extract the login identifier from the ticket response.
pub fn parse_login_ticket(body: &str) -> Option<String> {
    QR_UUID_RE
        .captures(body)
        .or_else(|| QUOTED_RE.captures(body))
        .map(|caps| caps[1].to_string())
}

/// Outcome of one login status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// `201`: the code was scanned, confirmation pending.
    Scanned,
    /// `200`: confirmed; carries the redirect target.
    Confirmed(RedirectTarget),
    /// `408`: the wait window elapsed.
    Timeout,
    /// Any other code.
    Abnormal(u32),
}

/// Parse a status poll body. `None` means the body could not be read and the
/// poll should simply be repeated.
pub fn parse_login_status(body: &str) -> Option<LoginStatus> {
    let code: u32 = LOGIN_CODE_RE.captures(body)?[1].parse().ok()?;
    match code {
        201 => Some(LoginStatus::Scanned),
        200 => {
            let uri = REDIRECT_RE.captures(body)?[1].to_string();
            RedirectTarget::from_uri(&uri).map(LoginStatus::Confirmed)
        }
        408 => Some(LoginStatus::Timeout),
        other => Some(LoginStatus::Abnormal(other)),
    }
}

/// Redirect URI returned on confirmation, with the routing derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Full URI to fetch the session tokens from, `&fun=new` included.
    pub redirect_uri: String,
    /// Everything before the last `/` of the redirect URI.
    pub base_uri: String,
    /// Authority of the base URI.
    pub base_host: String,
}

impl RedirectTarget {
    pub fn from_uri(uri: &str) -> Option<Self> {
        let redirect_uri = format!("{uri}&fun=new");
        let base_uri = redirect_uri[..redirect_uri.rfind('/')?].to_string();
        let base_host = host_of(&base_uri)?.to_string();
        Some(Self {
            redirect_uri,
            base_uri,
            base_host,
        })
    }
}

/// Authority part of an absolute URL.
pub fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://")?.1;
    let host = rest.split(['/', '?']).next()?;
    (!host.is_empty()).then_some(host)
}

/// `(retcode, selector)` pair from the sync check endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCheck {
    pub retcode: String,
    pub selector: String,
}

impl SyncCheck {
    /// Sentinel for an empty or unreadable check response.
    pub fn unknown() -> Self {
        Self::new("9999", "0")
    }

    pub fn new(retcode: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            retcode: retcode.into(),
            selector: selector.into(),
        }
    }
}

/// Parse a sync check body; unreadable bodies map to [`SyncCheck::unknown`].
pub fn parse_sync_check(body: &str) -> SyncCheck {
    match SYNC_CHECK_RE.captures(body) {
        Some(caps) => SyncCheck::new(&caps[1], &caps[2]),
        None => SyncCheck::unknown(),
    }
}

/// Tokens carried by the post-redirect XML response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct AuthTokens {
    pub ret: i64,
    pub message: String,
    pub skey: String,
    pub wxsid: String,
    pub wxuin: String,
    pub pass_ticket: String,
}

/// Decode the redirect response. Missing tokens or a non-zero `ret` fail the
/// whole step; there is no partial session.
pub fn parse_auth_tokens(body: &str) -> Result<AuthTokens> {
    let tokens: AuthTokens = quick_xml::de::from_str(body)?;
    if tokens.ret != 0 {
        return Err(Error::Rejected {
            endpoint: "login redirect",
            ret: tokens.ret,
        });
    }
    if tokens.skey.is_empty() || tokens.wxsid.is_empty() || tokens.wxuin.is_empty() {
        return Err(Error::protocol("login redirect", "missing session tokens"));
    }
    Ok(tokens)
}
