//! Inbound and outbound message values.
//!
//! Messages are transient: nothing here is persisted by the engine.

use serde::Serialize;

use crate::types::Friend;

/// Category of a message, decoded from the service's numeric `MsgType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Emoticon,
    /// Links, files and other app messages.
    App,
    /// A friend request; see [`ReceivedMessage::friend_request`].
    FriendRequest,
    /// Notices generated by the service (joins, recalls, ...).
    System,
    /// The web client's own "conversation opened" notices.
    StatusNotify,
    Other(i64),
}

impl MessageKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MessageKind::Text,
            3 => MessageKind::Image,
            34 => MessageKind::Voice,
            43 | 62 => MessageKind::Video,
            47 => MessageKind::Emoticon,
            49 => MessageKind::App,
            37 => MessageKind::FriendRequest,
            10000 | 10002 => MessageKind::System,
            51 => MessageKind::StatusNotify,
            other => MessageKind::Other(other),
        }
    }

    /// Numeric code used on the send endpoints.
    pub fn code(self) -> i64 {
        match self {
            MessageKind::Text => 1,
            MessageKind::Image => 3,
            MessageKind::Voice => 34,
            MessageKind::Video => 43,
            MessageKind::Emoticon => 47,
            MessageKind::App => 49,
            MessageKind::FriendRequest => 37,
            MessageKind::System => 10000,
            MessageKind::StatusNotify => 51,
            MessageKind::Other(code) => code,
        }
    }

    pub fn has_media(self) -> bool {
        matches!(
            self,
            MessageKind::Image | MessageKind::Voice | MessageKind::Video
        )
    }
}

/// Pending friend request attached to a [`MessageKind::FriendRequest`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendRequest {
    pub user_name: String,
    pub nick_name: String,
    pub content: String,
    /// Ticket required to accept the request.
    pub ticket: String,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedMessage {
    pub msg_id: String,
    pub kind: MessageKind,
    pub from_user_name: String,
    pub to_user_name: String,
    /// For group messages, the member who actually sent it.
    pub group_sender: Option<String>,
    pub content: String,
    pub create_time: i64,
    /// Download URL for image, voice and video payloads.
    pub media_url: Option<String>,
    pub friend_request: Option<FriendRequest>,
}

impl ReceivedMessage {
    pub fn is_group(&self) -> bool {
        crate::types::is_group(&self.from_user_name)
    }
}

/// Everything a full sync fetch delivered, already decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SyncUpdate {
    pub messages: Vec<ReceivedMessage>,
    /// Friends seen for the first time in this sync.
    pub new_friends: Vec<Friend>,
    /// User-names of modified contacts (friends and groups).
    pub modified: Vec<String>,
    /// User-names removed from the directory.
    pub deleted: Vec<String>,
}

impl SyncUpdate {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.new_friends.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
    }
}

/// Payload of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutgoingPayload {
    Text(String),
    /// Reference to media previously uploaded.
    Media(String),
}

/// An outbound message before it is put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub kind: MessageKind,
    pub from_user_name: String,
    pub to_user_name: String,
    pub payload: OutgoingPayload,
    /// Client-assigned correlation id, echoed back as `LocalID`.
    pub local_id: String,
}

/// Acknowledgement of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub msg_id: String,
    pub local_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(MessageKind::from_code(1), MessageKind::Text);
        assert_eq!(MessageKind::from_code(62), MessageKind::Video);
        assert_eq!(MessageKind::from_code(10002), MessageKind::System);
        assert_eq!(MessageKind::from_code(9), MessageKind::Other(9));
        assert_eq!(MessageKind::Image.code(), 3);
        assert!(MessageKind::Voice.has_media());
        assert!(!MessageKind::Text.has_media());
    }
}
