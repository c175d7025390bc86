//! Outbound calls: messages, media uploads, status notifications and the
//! contact management endpoints.

use std::fs;
use std::path::Path;

use chrono::{Local, Utc};
use log::{debug, info, warn};
use md5::{Digest, Md5};

use super::Client;
use crate::error::{Error, Result};
use crate::protocol::message::{build_image_message, build_text_message};
use crate::protocol::request::{
    InviteMemberRequest, NotifyCode, OplogRequest, SendMsgRequest, StatusNotifyRequest,
    UploadMediaRequest, VerifyUserEntry, VerifyUserRequest,
};
use crate::protocol::response::{decode, SendMsgResponse, StatusResponse, UploadMediaResponse};
use crate::transport::{FilePart, MultipartForm, Transport};
use crate::types::{OutgoingMessage, SendReceipt};

/// Cookie carrying the upload ticket issued at login.
const DATA_TICKET_COOKIE: &str = "webwx_data_ticket";

/// Scene sent with friend verification requests.
const VERIFY_SCENE: i32 = 33;

/// `webwxoplog` command that sets a remark name.
const OPLOG_SET_REMARK: i32 = 2;

/// Friend verification operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOpcode {
    /// Send a friend request.
    Add = 2,
    /// Accept an incoming friend request.
    Accept = 3,
}

/// MIME type of an image, sniffed from its leading bytes.
fn image_content_type(bytes: &[u8], file_name: &str) -> &'static str {
    match bytes {
        [0xff, 0xd8, 0xff, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'B', b'M', ..] => "image/bmp",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => {
            let ext = Path::new(file_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase);
            match ext.as_deref() {
                Some("png") => "image/png",
                Some("gif") => "image/gif",
                Some("bmp") => "image/bmp",
                Some("webp") => "image/webp",
                Some("jpg" | "jpeg") => "image/jpeg",
                _ => "application/octet-stream",
            }
        }
    }
}

impl<T: Transport> Client<T> {
    fn ensure_logged_in(&self) -> Result<()> {
        if self.read_session().is_established() {
            Ok(())
        } else {
            Err(Error::NotLoggedIn)
        }
    }

    /// `webwxstatusnotify` from the logged-in account to `to`, or to itself
    /// when `to` is `None`.
    pub fn status_notify(&self, code: NotifyCode, to: Option<&str>) -> Result<()> {
        let (url, request) = {
            let session = self.read_session();
            let request = StatusNotifyRequest {
                base_request: session.base_request(),
                code: code as i32,
                from_user_name: session.user_name.clone(),
                to_user_name: to.unwrap_or(session.user_name.as_str()).to_string(),
                client_msg_id: Utc::now().timestamp_millis(),
            };
            (session.status_notify_url(&self.config.lang), request)
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        decode::<StatusResponse>("webwxstatusnotify", &body)?;
        Ok(())
    }

    /// Mark the conversation with `to` as read. Failures are only logged.
    pub fn mark_read(&self, to: &str) {
        if let Err(e) = self.status_notify(NotifyCode::Read, Some(to)) {
            warn!("read receipt to {} failed: {}", to, e);
        }
    }

    fn post_message(
        &self,
        endpoint: &'static str,
        url: &str,
        message: &OutgoingMessage,
    ) -> Result<SendReceipt> {
        let request = SendMsgRequest {
            base_request: self.read_session().base_request(),
            msg: message.into(),
            scene: 0,
        };
        let body = self
            .transport
            .post_json(url, &serde_json::to_string(&request)?)?;
        let response: SendMsgResponse = decode(endpoint, &body)?;
        let local_id = if response.local_id.is_empty() {
            message.local_id.clone()
        } else {
            response.local_id
        };
        debug!("{} to {} ok, msg id {}", endpoint, message.to_user_name, response.msg_id);
        Ok(SendReceipt {
            msg_id: response.msg_id,
            local_id,
        })
    }

    pub fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt> {
        self.ensure_logged_in()?;
        let (url, message) = {
            let session = self.read_session();
            (
                session.send_msg_url(),
                build_text_message(&session.user_name, to, text),
            )
        };
        self.post_message("webwxsendmsg", &url, &message)
    }

    /// Send to a friend or group addressed by display name. Friends win
    /// when both match.
    pub fn send_text_by_name(&self, name: &str, text: &str) -> Result<SendReceipt> {
        let user_name = {
            let directory = self.read_directory();
            directory
                .friend_by_name(name)
                .map(|friend| friend.user_name.clone())
                .or_else(|| directory.group_by_name(name).map(|g| g.user_name.clone()))
        }
        .ok_or_else(|| Error::UnknownContact(name.to_string()))?;
        self.send_text(&user_name, text)
    }

    /// Upload an image for `to` and return its media id.
    ///
    /// The primary upload host is tried first; the secondary one once, if the
    /// primary fails or rejects the upload.
    pub fn upload_media(&self, to: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        self.ensure_logged_in()?;
        let content_type = image_content_type(bytes, file_name);
        let file_md5 = hex::encode(Md5::digest(bytes));
        let size = bytes.len() as u64;

        let (urls, form) = {
            let mut session = self.write_session();
            let request = UploadMediaRequest {
                upload_type: 2,
                base_request: session.base_request(),
                client_media_id: Utc::now().timestamp_millis(),
                total_len: size,
                start_pos: 0,
                data_len: size,
                media_type: 4,
                from_user_name: session.user_name.clone(),
                to_user_name: to.to_string(),
                file_md5,
            };
            let mut form = MultipartForm::new()
                .text("id", format!("WU_FILE_{}", session.next_media_index()))
                .text("name", file_name)
                .text("type", content_type)
                .text(
                    "lastModifiedDate",
                    Local::now().format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
                )
                .text("size", size.to_string())
                .text("mediatype", "pic")
                .text("uploadmediarequest", serde_json::to_string(&request)?);
            if let Some(ticket) = self.transport.cookie(DATA_TICKET_COOKIE) {
                form = form.text(DATA_TICKET_COOKIE, ticket);
            }
            let form = form.text("pass_ticket", session.pass_ticket.clone()).file(FilePart {
                field: "filename".into(),
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            });
            (session.upload_urls(), form)
        };

        let mut last_error = Error::protocol("webwxuploadmedia", "no upload host");
        for url in &urls {
            let outcome = self
                .transport
                .post_multipart(url, &form)
                .and_then(|body| decode::<UploadMediaResponse>("webwxuploadmedia", &body));
            match outcome {
                Ok(response) if !response.media_id.is_empty() => {
                    info!("uploaded {} ({} bytes)", file_name, size);
                    return Ok(response.media_id);
                }
                Ok(_) => {
                    last_error = Error::protocol("webwxuploadmedia", "empty media id");
                    warn!("upload to {} returned no media id", url);
                }
                Err(e) => {
                    warn!("upload to {} failed: {}", url, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Send an already uploaded image.
    pub fn send_image(&self, to: &str, media_id: &str) -> Result<SendReceipt> {
        self.ensure_logged_in()?;
        let (url, message) = {
            let session = self.read_session();
            (
                session.send_image_url(&self.config.lang),
                build_image_message(&session.user_name, to, media_id),
            )
        };
        self.post_message("webwxsendmsgimg", &url, &message)
    }

    /// Upload the image at `path` and send it.
    pub fn send_image_file(&self, to: &str, path: impl AsRef<Path>) -> Result<SendReceipt> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image.jpg");
        let media_id = self.upload_media(to, file_name, &bytes)?;
        self.send_image(to, &media_id)
    }

    /// Send or accept a friend request.
    pub fn verify_user(
        &self,
        opcode: VerifyOpcode,
        user_name: &str,
        ticket: &str,
        content: &str,
    ) -> Result<()> {
        self.ensure_logged_in()?;
        let (url, request) = {
            let session = self.read_session();
            let request = VerifyUserRequest {
                base_request: session.base_request(),
                opcode: opcode as i32,
                scene_list: vec![VERIFY_SCENE],
                scene_list_count: 1,
                verify_content: content.to_string(),
                verify_user_list: vec![VerifyUserEntry {
                    value: user_name.to_string(),
                    verify_user_ticket: ticket.to_string(),
                }],
                verify_user_list_size: 1,
                skey: session.skey.clone(),
            };
            (session.verify_user_url(&self.config.lang), request)
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        decode::<StatusResponse>("webwxverifyuser", &body)?;
        Ok(())
    }

    /// Invite contacts into a group.
    pub fn invite_members(&self, group: &str, members: &[&str]) -> Result<()> {
        self.ensure_logged_in()?;
        let (url, request) = {
            let session = self.read_session();
            let request = InviteMemberRequest {
                base_request: session.base_request(),
                chat_room_name: group.to_string(),
                invite_member_list: members.join(","),
            };
            (session.invite_member_url(), request)
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        decode::<StatusResponse>("webwxupdatechatroom", &body)?;
        Ok(())
    }

    pub(super) fn oplog_remark(&self, user_name: &str, remark_name: &str) -> Result<()> {
        let (url, request) = {
            let session = self.read_session();
            let request = OplogRequest {
                base_request: session.base_request(),
                cmd_id: OPLOG_SET_REMARK,
                remark_name: remark_name.to_string(),
                user_name: user_name.to_string(),
            };
            (session.oplog_url(), request)
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        decode::<StatusResponse>("webwxoplog", &body)?;
        Ok(())
    }

    /// Give a friend a new remark name, remotely and in the directory.
    pub fn set_remark(&self, user_name: &str, remark_name: &str) -> Result<()> {
        self.ensure_logged_in()?;
        {
            let directory = self.read_directory();
            if directory.friend(user_name).is_none() {
                return Err(Error::UnknownContact(user_name.to_string()));
            }
            if directory
                .friend_by_name(remark_name)
                .is_some_and(|friend| friend.user_name != user_name)
            {
                return Err(Error::NameTaken(remark_name.to_string()));
            }
        }
        self.oplog_remark(user_name, remark_name)?;
        self.write_directory()
            .set_remark(user_name, remark_name, Utc::now().timestamp());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::protocol::response::RawContact;

    const JPEG: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn add_friend(client: &Client<crate::transport::mock::MockTransport>, user: &str, nick: &str) {
        client.write_directory().insert_friend(
            &RawContact {
                user_name: user.into(),
                nick_name: nick.into(),
                ..Default::default()
            },
            1,
        );
    }

    #[test]
    fn test_content_type_sniffing() {
        assert_eq!(image_content_type(JPEG, "x.bin"), "image/jpeg");
        assert_eq!(image_content_type(b"\x89PNG\r\n", "x"), "image/png");
        assert_eq!(image_content_type(b"RIFF\0\0\0\0WEBPVP8", "x"), "image/webp");
        assert_eq!(image_content_type(b"????", "photo.GIF"), "image/gif");
        assert_eq!(image_content_type(b"????", "notes"), "application/octet-stream");
    }

    #[test]
    fn test_send_text_body() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client.transport().on(
            "webwxsendmsg",
            r#"{"BaseResponse":{"Ret":0},"MsgID":"900","LocalID":"123"}"#,
        );

        let receipt = client.send_text("@a", "hi").unwrap();
        assert_eq!(receipt.msg_id, "900");
        assert_eq!(receipt.local_id, "123");

        let request = &client.transport().requests_to("webwxsendmsg")[0];
        assert!(request.url.ends_with("/webwxsendmsg?pass_ticket=pt"));
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["Scene"], 0);
        assert_eq!(body["BaseRequest"]["Uin"], 42);
        assert_eq!(body["Msg"]["Type"], 1);
        assert_eq!(body["Msg"]["Content"], "hi");
        assert_eq!(body["Msg"]["FromUserName"], "@me");
        assert_eq!(body["Msg"]["ToUserName"], "@a");
        assert_eq!(body["Msg"]["LocalID"], body["Msg"]["ClientMsgId"]);
    }

    #[test]
    fn test_send_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::client(dir.path());
        assert!(matches!(client.send_text("@a", "hi"), Err(Error::NotLoggedIn)));
        assert_eq!(client.transport().requests().len(), 0);
    }

    #[test]
    fn test_send_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        add_friend(&client, "@a", "ann");
        client
            .transport()
            .on("webwxsendmsg", r#"{"BaseResponse":{"Ret":0},"MsgID":"1"}"#);

        let receipt = client.send_text_by_name("ann", "hello").unwrap();
        assert!(!receipt.local_id.is_empty());
        let request = &client.transport().requests_to("webwxsendmsg")[0];
        assert!(request.body.contains(r#""ToUserName":"@a""#));

        assert!(matches!(
            client.send_text_by_name("nobody", "hello"),
            Err(Error::UnknownContact(_))
        ));
    }

    #[test]
    fn test_upload_falls_back_to_secondary_host() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client.transport().set_cookie(DATA_TICKET_COOKIE, "ticket");
        client
            .transport()
            .on("https://file.wx.example/", r#"{"BaseResponse":{"Ret":1},"MediaId":""}"#)
            .on(
                "https://file2.wx.example/",
                r#"{"BaseResponse":{"Ret":0},"MediaId":"@media"}"#,
            );

        let media_id = client.upload_media("@a", "cat.jpg", JPEG).unwrap();
        assert_eq!(media_id, "@media");

        let uploads = client.transport().requests_to("webwxuploadmedia");
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().all(|upload| upload.method == "POST"));
        let form = uploads[1].form.as_ref().unwrap();
        assert_eq!(form.field("id"), Some("WU_FILE_0"));
        assert_eq!(form.field("type"), Some("image/jpeg"));
        assert_eq!(form.field("mediatype"), Some("pic"));
        assert_eq!(form.field("size"), Some("10"));
        assert_eq!(form.field(DATA_TICKET_COOKIE), Some("ticket"));
        assert_eq!(form.field("pass_ticket"), Some("pt"));

        let request: serde_json::Value =
            serde_json::from_str(form.field("uploadmediarequest").unwrap()).unwrap();
        assert_eq!(request["FileMd5"], hex::encode(Md5::digest(JPEG)));
        assert_eq!(request["ToUserName"], "@a");
        assert_eq!(request["TotalLen"], 10);

        let file = form.file_part().unwrap();
        assert_eq!(file.field, "filename");
        assert_eq!(file.bytes, JPEG);
    }

    #[test]
    fn test_upload_fails_when_both_hosts_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client
            .transport()
            .fail("https://file.wx.example/", "reset")
            .on("https://file2.wx.example/", r#"{"BaseResponse":{"Ret":1}}"#);

        let err = client.upload_media("@a", "cat.jpg", JPEG).unwrap_err();
        assert!(matches!(err, Error::Rejected { ret: 1, .. }));
    }

    #[test]
    fn test_send_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        let path = dir.path().join("cat.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();
        client
            .transport()
            .on("webwxuploadmedia", r#"{"BaseResponse":{"Ret":0},"MediaId":"@m"}"#)
            .on("webwxsendmsgimg", r#"{"BaseResponse":{"Ret":0},"MsgID":"7"}"#);

        let receipt = client.send_image_file("@a", &path).unwrap();
        assert_eq!(receipt.msg_id, "7");
        let send = &client.transport().requests_to("webwxsendmsgimg")[0];
        assert!(send.body.contains(r#""MediaId":"@m""#));
        assert!(send.body.contains(r#""Type":3"#));
        assert_eq!(client.transport().count("webwxsendmsg?"), 0);
    }

    #[test]
    fn test_mark_read_swallows_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client.transport().fail("webwxstatusnotify", "reset");
        client.mark_read("@a");

        let request = &client.transport().requests_to("webwxstatusnotify")[0];
        assert!(request.body.contains(r#""Code":1"#));
        assert!(request.body.contains(r#""ToUserName":"@a""#));
    }

    #[test]
    fn test_verify_and_invite_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        client
            .transport()
            .on("webwxverifyuser", r#"{"BaseResponse":{"Ret":0}}"#)
            .on("webwxupdatechatroom", r#"{"BaseResponse":{"Ret":0}}"#);

        client
            .verify_user(VerifyOpcode::Accept, "@a", "v1_ticket", "")
            .unwrap();
        client.invite_members("@@g", &["@a", "@b"]).unwrap();

        let verify: serde_json::Value = serde_json::from_str(
            &client.transport().requests_to("webwxverifyuser")[0].body,
        )
        .unwrap();
        assert_eq!(verify["Opcode"], 3);
        assert_eq!(verify["SceneList"][0], 33);
        assert_eq!(verify["VerifyUserList"][0]["VerifyUserTicket"], "v1_ticket");
        assert_eq!(verify["skey"], "@crypt");

        let invite = &client.transport().requests_to("webwxupdatechatroom")[0];
        assert!(invite.url.contains("fun=invitemember"));
        assert!(invite.body.contains(r#""InviteMemberList":"@a,@b""#));
    }

    #[test]
    fn test_set_remark() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _) = testing::established(dir.path());
        add_friend(&client, "@a", "ann");
        add_friend(&client, "@b", "ben");
        client
            .transport()
            .on("webwxoplog", r#"{"BaseResponse":{"Ret":0}}"#);

        assert!(matches!(
            client.set_remark("@a", "ben"),
            Err(Error::NameTaken(_))
        ));
        assert_eq!(client.transport().count("webwxoplog"), 0);

        client.set_remark("@a", "Annie").unwrap();
        assert_eq!(client.friend_by_name("Annie").unwrap().user_name, "@a");
        assert!(client.transport().requests_to("webwxoplog")[0]
            .body
            .contains(r#""RemarkName":"Annie""#));
    }
}
