//! Scripted transport for tests.
//!
//! Replies are registered per URL fragment; the longest matching fragment
//! wins. Each fragment answers from a queue whose last reply repeats forever.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{MultipartForm, Transport};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Bytes(Vec<u8>),
    Fail(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub body: String,
    pub form: Option<MultipartForm>,
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    requests: Mutex<Vec<Recorded>>,
    cookies: Mutex<HashMap<String, String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, fragment: &str, reply: Reply) -> &Self {
        let mut routes = lock(&self.routes);
        match routes.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, replies)) => replies.push_back(reply),
            None => routes.push((fragment.to_string(), VecDeque::from([reply]))),
        }
        self
    }

    pub fn on(&self, fragment: &str, body: &str) -> &Self {
        self.push(fragment, Reply::Body(body.to_string()))
    }

    pub fn on_bytes(&self, fragment: &str, bytes: &[u8]) -> &Self {
        self.push(fragment, Reply::Bytes(bytes.to_vec()))
    }

    pub fn fail(&self, fragment: &str, reason: &str) -> &Self {
        self.push(fragment, Reply::Fail(reason.to_string()))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        lock(&self.requests).clone()
    }

    pub fn requests_to(&self, fragment: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.requests_to(fragment).len()
    }

    fn reply(
        &self,
        method: &'static str,
        url: &str,
        body: String,
        form: Option<MultipartForm>,
    ) -> Result<Reply> {
        lock(&self.requests).push(Recorded {
            method,
            url: url.to_string(),
            body,
            form,
        });
        let mut routes = lock(&self.routes);
        let (_, replies) = routes
            .iter_mut()
            .filter(|(fragment, _)| url.contains(fragment.as_str()))
            .max_by_key(|(fragment, _)| fragment.len())
            .ok_or_else(|| Error::Transport(format!("no scripted reply for {url}")))?;
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        match reply {
            Some(Reply::Fail(reason)) => Err(Error::Transport(reason)),
            Some(reply) => Ok(reply),
            None => Err(Error::Transport(format!("no scripted reply for {url}"))),
        }
    }

    fn text(
        &self,
        method: &'static str,
        url: &str,
        body: String,
        form: Option<MultipartForm>,
    ) -> Result<String> {
        match self.reply(method, url, body, form)? {
            Reply::Body(text) => Ok(text),
            Reply::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Reply::Fail(reason) => Err(Error::Transport(reason)),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<String> {
        self.text("GET", url, String::new(), None)
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        match self.reply("GET", url, String::new(), None)? {
            Reply::Body(text) => Ok(text.into_bytes()),
            Reply::Bytes(bytes) => Ok(bytes),
            Reply::Fail(reason) => Err(Error::Transport(reason)),
        }
    }

    fn post_json(&self, url: &str, body: &str) -> Result<String> {
        self.text("POST", url, body.to_string(), None)
    }

    fn post_multipart(&self, url: &str, form: &MultipartForm) -> Result<String> {
        self.text("POST", url, String::new(), Some(form.clone()))
    }

    fn cookie(&self, name: &str) -> Option<String> {
        lock(&self.cookies).get(name).cloned()
    }

    fn set_cookie(&self, name: &str, value: &str) {
        lock(&self.cookies).insert(name.to_string(), value.to_string());
    }
}
