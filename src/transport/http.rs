//! Blocking HTTP transport over `ureq`.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use super::{MultipartForm, Transport};
use crate::config::WebwxConfig;
use crate::error::{Error, Result};
use crate::protocol::decode::host_of;

/// Production transport: one `ureq` agent and a name-keyed cookie jar.
pub struct HttpTransport {
    agent: ureq::Agent,
    cookies: Mutex<BTreeMap<String, String>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("cookies", &self.jar().len())
            .finish()
    }
}

/// `name=value` from a `Set-Cookie` header, attributes dropped.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

impl HttpTransport {
    pub fn new(config: &WebwxConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.http_timeout())
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            cookies: Mutex::new(BTreeMap::new()),
        }
    }

    fn jar(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cookie_header(&self) -> Option<String> {
        let jar = self.jar();
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut request = self.agent.request(method, url);
        if let Some(host) = host_of(url) {
            request = request.set("Referer", &format!("https://{host}/"));
        }
        if let Some(cookies) = self.cookie_header() {
            request = request.set("Cookie", &cookies);
        }
        request
    }

    fn store_cookies(&self, response: &ureq::Response) {
        let headers = response.all("set-cookie");
        if headers.is_empty() {
            return;
        }
        let mut jar = self.jar();
        for header in headers {
            if let Some((name, value)) = parse_set_cookie(header) {
                trace!("cookie {} updated", name);
                jar.insert(name, value);
            }
        }
    }

    fn finish(
        &self,
        url: &str,
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response> {
        let response = result.map_err(|e| Error::Transport(e.to_string()))?;
        debug!("{} -> {}", url, response.status());
        self.store_cookies(&response);
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String> {
        let response = self.finish(url, self.request("GET", url).call())?;
        response
            .into_string()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.finish(url, self.request("GET", url).call())?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(bytes)
    }

    fn post_json(&self, url: &str, body: &str) -> Result<String> {
        let request = self
            .request("POST", url)
            .set("Content-Type", "application/json;charset=utf-8");
        let response = self.finish(url, request.send_string(body))?;
        response
            .into_string()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn post_multipart(&self, url: &str, form: &MultipartForm) -> Result<String> {
        let request = self
            .request("POST", url)
            .set("Content-Type", &form.content_type());
        let response = self.finish(url, request.send_bytes(&form.to_bytes()))?;
        response
            .into_string()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.jar().get(name).cloned()
    }

    fn set_cookie(&self, name: &str, value: &str) {
        self.jar().insert(name.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie() {
        assert_eq!(
            parse_set_cookie("wxloadtime=1500000000; Domain=wx.qq.com; Path=/"),
            Some(("wxloadtime".to_string(), "1500000000".to_string()))
        );
        assert_eq!(parse_set_cookie("novalue"), None);
        assert_eq!(parse_set_cookie("=x"), None);
    }

    #[test]
    fn test_cookie_jar() {
        let transport = HttpTransport::new(&WebwxConfig::default());
        assert!(transport.cookie_header().is_none());
        transport.set_cookie("wxuin", "1");
        transport.set_cookie("webwx_data_ticket", "t");
        assert_eq!(transport.cookie("wxuin").as_deref(), Some("1"));
        assert_eq!(
            transport.cookie_header().as_deref(),
            Some("webwx_data_ticket=t; wxuin=1")
        );
    }
}
