//! webwx-rust: web IM session engine
//!
//! Drives a browser-style chat session end to end over plain HTTP: the QR
//! login handshake, the long-poll sync loop, the in-memory contact directory
//! and outbound message dispatch.
//!
//! ## Modules
//!
//! - `client` - The session engine ([`Client`])
//! - `protocol` - Request bodies, response schemas and text decoders
//! - `directory` - Friends, groups and display-name uniqueness
//! - `session` - Authentication tokens, sync cursor and endpoint URLs
//! - `state` - Login phases and the engine lifecycle
//! - `transport` - HTTP transport contract and the `ureq` implementation
//! - `types` - Contacts and messages

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod types;

pub use client::{Client, VerifyOpcode};
pub use config::WebwxConfig;
pub use error::{Error, Result};
pub use handler::{NoopHandler, SessionHandler};
pub use state::{LoginPhase, Presence, StatusSnapshot};
pub use transport::{HttpTransport, Transport};
