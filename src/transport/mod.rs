//! HTTP transport contract.
//!
//! The engine builds every URL and body itself; a [`Transport`] only executes
//! requests and keeps cookies for the lifetime of the session.

mod http;
#[cfg(test)]
pub(crate) mod mock;
mod multipart;

pub use http::HttpTransport;
pub use multipart::{FilePart, MultipartForm, UPLOAD_BOUNDARY};

use crate::error::Result;

/// Blocking request executor with a session-wide cookie jar.
pub trait Transport: Send + Sync {
    /// GET, returning the body as text.
    fn get(&self, url: &str) -> Result<String>;

    /// GET, returning the raw body.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// POST a JSON document.
    fn post_json(&self, url: &str, body: &str) -> Result<String>;

    /// POST a `multipart/form-data` body.
    fn post_multipart(&self, url: &str, form: &MultipartForm) -> Result<String>;

    /// Current value of a stored cookie.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Overwrite (or create) a stored cookie.
    fn set_cookie(&self, name: &str, value: &str);
}
