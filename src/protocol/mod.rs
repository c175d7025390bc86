//! Wire-level protocol: request bodies, response schemas and decoders.
//!
//! Nothing outside this module parses raw response text.

pub mod decode;
pub mod message;
pub mod qr;
pub mod request;
pub mod response;

pub use decode::{LoginStatus, RedirectTarget, SyncCheck};
pub use qr::QrTicket;
