//! Domain values: contacts, groups and messages.

mod contact;
mod message;

pub use contact::*;
pub use message::*;
