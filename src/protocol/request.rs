//! Request bodies for the authenticated JSON endpoints.
//!
//! Every body embeds a [`BaseRequest`] built from the current session tokens.

use serde::Serialize;

use crate::protocol::response::SyncKey;

/// Identity block carried by every authenticated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct BaseRequest {
    pub uin: i64,
    pub sid: String,
    pub skey: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitRequest {
    pub base_request: BaseRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncRequest {
    pub base_request: BaseRequest,
    pub sync_key: SyncKey,
    /// Bitwise complement of the unix time, as the web client sends it.
    #[serde(rename = "rr")]
    pub rr: i64,
}

/// Status notification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyCode {
    /// A conversation was read.
    Read = 1,
    /// The client came online.
    Online = 3,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusNotifyRequest {
    pub base_request: BaseRequest,
    pub code: i32,
    pub from_user_name: String,
    pub to_user_name: String,
    pub client_msg_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchContactItem {
    pub user_name: String,
    pub encry_chat_room_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchContactRequest {
    pub base_request: BaseRequest,
    pub count: usize,
    pub list: Vec<BatchContactItem>,
}

impl BatchContactRequest {
    pub fn new(base_request: BaseRequest, list: Vec<BatchContactItem>) -> Self {
        Self {
            base_request,
            count: list.len(),
            list,
        }
    }
}

/// Outbound message as the send endpoints expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundMsg {
    #[serde(rename = "Type")]
    pub msg_type: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    pub from_user_name: String,
    pub to_user_name: String,
    #[serde(rename = "LocalID")]
    pub local_id: String,
    pub client_msg_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMsgRequest {
    pub base_request: BaseRequest,
    pub msg: OutboundMsg,
    pub scene: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadMediaRequest {
    pub upload_type: i32,
    pub base_request: BaseRequest,
    pub client_media_id: i64,
    pub total_len: u64,
    pub start_pos: u64,
    pub data_len: u64,
    pub media_type: i32,
    pub from_user_name: String,
    pub to_user_name: String,
    pub file_md5: String,
}

/// `webwxoplog` with `CmdId = 2` sets a contact's remark name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OplogRequest {
    pub base_request: BaseRequest,
    pub cmd_id: i32,
    pub remark_name: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerifyUserEntry {
    pub value: String,
    pub verify_user_ticket: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VerifyUserRequest {
    pub base_request: BaseRequest,
    pub opcode: i32,
    pub scene_list: Vec<i32>,
    pub scene_list_count: usize,
    pub verify_content: String,
    pub verify_user_list: Vec<VerifyUserEntry>,
    pub verify_user_list_size: usize,
    #[serde(rename = "skey")]
    pub skey: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InviteMemberRequest {
    pub base_request: BaseRequest,
    pub chat_room_name: String,
    /// Comma separated member user-names.
    pub invite_member_list: String,
}
