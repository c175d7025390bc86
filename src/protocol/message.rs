//! Message building and decoding.
//!
//! Turns `AddMsgList` entries into [`ReceivedMessage`] values and builds the
//! outbound message bodies for the send endpoints.

use chrono::Utc;
use rand::Rng;

use crate::protocol::request::OutboundMsg;
use crate::protocol::response::RawMessage;
use crate::types::{
    is_group, FriendRequest, MessageKind, OutgoingMessage, OutgoingPayload, ReceivedMessage,
};

/// Separator between the sender prefix and the body of a group message.
const GROUP_SENDER_SEPARATOR: &str = ":<br/>";

/// Generate a client correlation id: unix millis, a `0`, three random digits.
///
/// Uniqueness is best-effort only.
pub fn generate_client_msg_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    format!("{}0{:03}", Utc::now().timestamp_millis(), suffix)
}

/// Build a text message.
pub fn build_text_message(from: &str, to: &str, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        kind: MessageKind::Text,
        from_user_name: from.to_string(),
        to_user_name: to.to_string(),
        payload: OutgoingPayload::Text(text.to_string()),
        local_id: generate_client_msg_id(),
    }
}

/// Build an image message referencing an uploaded media id.
pub fn build_image_message(from: &str, to: &str, media_id: &str) -> OutgoingMessage {
    OutgoingMessage {
        kind: MessageKind::Image,
        from_user_name: from.to_string(),
        to_user_name: to.to_string(),
        payload: OutgoingPayload::Media(media_id.to_string()),
        local_id: generate_client_msg_id(),
    }
}

impl From<&OutgoingMessage> for OutboundMsg {
    fn from(message: &OutgoingMessage) -> Self {
        let (content, media_id) = match &message.payload {
            OutgoingPayload::Text(text) => (Some(text.clone()), None),
            OutgoingPayload::Media(id) => (None, Some(id.clone())),
        };
        OutboundMsg {
            msg_type: message.kind.code(),
            content,
            media_id,
            from_user_name: message.from_user_name.clone(),
            to_user_name: message.to_user_name.clone(),
            local_id: message.local_id.clone(),
            client_msg_id: message.local_id.clone(),
        }
    }
}

/// Where media payloads are downloaded from.
#[derive(Debug, Clone, Copy)]
pub struct MediaContext<'a> {
    pub base_uri: &'a str,
    pub skey: &'a str,
}

impl MediaContext<'_> {
    fn media_url(&self, kind: MessageKind, msg_id: &str) -> Option<String> {
        let endpoint = match kind {
            MessageKind::Image => "webwxgetmsgimg?MsgID",
            MessageKind::Voice => "webwxgetvoice?msgid",
            MessageKind::Video => "webwxgetvideo?msgid",
            _ => return None,
        };
        Some(format!(
            "{}/{}={}&skey={}",
            self.base_uri, endpoint, msg_id, self.skey
        ))
    }
}

/// Decode one raw message.
pub fn parse_message(raw: &RawMessage, media: MediaContext<'_>) -> ReceivedMessage {
    let kind = MessageKind::from_code(raw.msg_type);

    let (group_sender, content) = if is_group(&raw.from_user_name) {
        match raw.content.split_once(GROUP_SENDER_SEPARATOR) {
            Some((sender, body)) if sender.starts_with('@') => {
                (Some(sender.to_string()), body.to_string())
            }
            _ => (None, raw.content.clone()),
        }
    } else {
        (None, raw.content.clone())
    };

    let friend_request = (kind == MessageKind::FriendRequest).then(|| FriendRequest {
        user_name: raw.recommend_info.user_name.clone(),
        nick_name: raw.recommend_info.nick_name.clone(),
        content: raw.recommend_info.content.clone(),
        ticket: raw.recommend_info.ticket.clone(),
    });

    ReceivedMessage {
        msg_id: raw.msg_id.clone(),
        kind,
        from_user_name: raw.from_user_name.clone(),
        to_user_name: raw.to_user_name.clone(),
        group_sender,
        content,
        create_time: raw.create_time,
        media_url: media.media_url(kind, &raw.msg_id),
        friend_request,
    }
}
