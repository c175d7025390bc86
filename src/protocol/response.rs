//! Response schemas for the JSON data endpoints.
//!
//! Each endpoint gets its own structure, decoded once at the boundary. Every
//! field defaults so that a missing key never aborts decoding; the callers
//! validate `BaseResponse.Ret` before trusting the rest.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Return code signalling success on every data endpoint.
pub const RET_SUCCESS: i64 = 0;

/// Application-level status present on nearly every response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct BaseResponse {
    pub ret: i64,
    pub err_msg: String,
}

/// Implemented by every response that carries a [`BaseResponse`].
pub trait Envelope: DeserializeOwned {
    fn base_response(&self) -> &BaseResponse;
}

macro_rules! envelope {
    ($($ty:ty),* $(,)?) => {
        $(impl Envelope for $ty {
            fn base_response(&self) -> &BaseResponse {
                &self.base_response
            }
        })*
    };
}

/// Decode a response and reject it unless `Ret` is success.
pub fn decode<T: Envelope>(endpoint: &'static str, body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return Err(Error::protocol(endpoint, "empty body"));
    }
    let parsed: T = serde_json::from_str(body)?;
    let ret = parsed.base_response().ret;
    if ret != RET_SUCCESS {
        return Err(Error::Rejected { endpoint, ret });
    }
    Ok(parsed)
}

/// One counter of the sync cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncKeyItem {
    pub key: i64,
    pub val: i64,
}

/// The sync cursor as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncKey {
    pub count: usize,
    pub list: Vec<SyncKeyItem>,
}

impl SyncKey {
    /// `key_val` pairs joined by `|`, in server order.
    pub fn to_query_value(&self) -> String {
        self.list
            .iter()
            .map(|item| format!("{}_{}", item.key, item.val))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserProfile {
    pub uin: i64,
    pub user_name: String,
    pub nick_name: String,
}

/// `webwxinit`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct InitResponse {
    pub base_response: BaseResponse,
    pub user: UserProfile,
    pub sync_key: SyncKey,
    /// Comma separated user-names of recent chats.
    pub chat_set: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawMember {
    pub user_name: String,
    pub nick_name: String,
    pub display_name: String,
}

/// A contact entry as returned by the list, batch and sync endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawContact {
    pub user_name: String,
    pub nick_name: String,
    pub remark_name: String,
    pub alias: String,
    pub city: String,
    pub province: String,
    pub signature: String,
    pub sex: i64,
    pub verify_flag: i64,
    pub contact_flag: i64,
    pub member_list: Vec<RawMember>,
    pub encry_chat_room_id: String,
}

/// `webwxgetcontact`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContactListResponse {
    pub base_response: BaseResponse,
    pub member_count: usize,
    pub member_list: Vec<RawContact>,
    /// Non-zero while more pages remain.
    pub seq: i64,
}

/// `webwxbatchgetcontact`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct BatchContactResponse {
    pub base_response: BaseResponse,
    pub count: usize,
    pub contact_list: Vec<RawContact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct RecommendInfo {
    pub user_name: String,
    pub nick_name: String,
    pub content: String,
    pub ticket: String,
}

/// A message entry of `AddMsgList`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct RawMessage {
    pub msg_id: String,
    pub new_msg_id: u64,
    pub from_user_name: String,
    pub to_user_name: String,
    pub msg_type: i64,
    pub content: String,
    pub create_time: i64,
    pub file_name: String,
    pub url: String,
    pub recommend_info: RecommendInfo,
}

/// `webwxsync`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncResponse {
    pub base_response: BaseResponse,
    pub add_msg_count: usize,
    pub add_msg_list: Vec<RawMessage>,
    pub mod_contact_count: usize,
    pub mod_contact_list: Vec<RawContact>,
    pub del_contact_count: usize,
    pub del_contact_list: Vec<RawContact>,
    pub sync_key: SyncKey,
}

/// `webwxuploadmedia`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct UploadMediaResponse {
    pub base_response: BaseResponse,
    pub media_id: String,
}

/// `webwxsendmsg` / `webwxsendmsgimg`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct SendMsgResponse {
    pub base_response: BaseResponse,
    #[serde(rename = "MsgID")]
    pub msg_id: String,
    #[serde(rename = "LocalID")]
    pub local_id: String,
}

/// Endpoints that only report a status.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct StatusResponse {
    pub base_response: BaseResponse,
}

envelope!(
    InitResponse,
    ContactListResponse,
    BatchContactResponse,
    SyncResponse,
    UploadMediaResponse,
    SendMsgResponse,
    StatusResponse,
);
