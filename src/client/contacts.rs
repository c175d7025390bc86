//! Directory synchronization: the paged contact list, batched group
//! resolution and member statistics.

use std::thread;

use chrono::Utc;
use log::{debug, info, warn};

use super::Client;
use crate::directory::Rename;
use crate::error::{Error, Result};
use crate::protocol::request::{BatchContactItem, BatchContactRequest};
use crate::protocol::response::{decode, BatchContactResponse, ContactListResponse, RawContact};
use crate::transport::Transport;
use crate::types::{is_group, Friend, MemberStats, Sex};

/// Groups resolved per `webwxbatchgetcontact` call.
pub const GROUP_BATCH_SIZE: usize = 20;

/// Members fetched per call when counting a group.
pub const MEMBER_BATCH_SIZE: usize = 50;

impl<T: Transport> Client<T> {
    /// Upsert a batch of records and push any renames the directory decided
    /// on. Returns the personal friends seen for the first time.
    pub(super) fn merge_contacts(&self, contacts: &[RawContact]) -> Vec<Friend> {
        let now = Utc::now().timestamp();
        let mut discovered = Vec::new();
        let mut renames = Vec::new();
        {
            let mut directory = self.write_directory();
            for raw in contacts {
                let change = directory.upsert(raw, now);
                if change.is_new {
                    if let Some(friend) = directory
                        .friend(&raw.user_name)
                        .filter(|friend| friend.is_personal())
                    {
                        discovered.push(friend.clone());
                    }
                }
                renames.extend(change.rename);
            }
        }
        self.push_renames(&renames);
        discovered
    }

    pub(super) fn report_discovered(&self, friends: &[Friend]) {
        if friends.is_empty() {
            return;
        }
        let owner = self.read_session().user_name.clone();
        self.handler.on_friends_discovered(&owner, friends);
    }

    /// Fetch the full contact list, page by page, into the directory.
    pub(super) fn sync_contacts(&self) -> Result<()> {
        let mut seq = 0;
        let mut discovered = Vec::new();
        loop {
            let url = self.read_session().contact_url(&self.config.lang, seq);
            let body = self.transport.post_json(&url, "{}")?;
            let page: ContactListResponse = decode("webwxgetcontact", &body)?;
            debug!(
                "webwxgetcontact seq {}: {} entries, next seq {}",
                seq,
                page.member_list.len(),
                page.seq
            );
            discovered.extend(self.merge_contacts(&page.member_list));

            if page.seq == 0 || page.seq == seq {
                break;
            }
            seq = page.seq;
        }

        let (friends, groups) = {
            let directory = self.read_directory();
            (directory.friend_count(), directory.group_count())
        };
        info!("directory holds {} friends and {} groups", friends, groups);
        self.report_discovered(&discovered);
        Ok(())
    }

    /// Persist uniqued display names as remarks. Failures only cost the
    /// remote copy; the local mapping is already consistent.
    pub(super) fn push_renames(&self, renames: &[Rename]) {
        for rename in renames {
            info!(
                "renaming {} to {} to keep display names unique",
                rename.user_name, rename.remark_name
            );
            if let Err(e) = self.oplog_remark(&rename.user_name, &rename.remark_name) {
                warn!("remark rename of {} failed: {}", rename.user_name, e);
            }
            thread::sleep(self.config.rename_throttle());
        }
    }

    /// Fill in names and members of every known group.
    pub(super) fn resolve_groups(&self) -> Result<()> {
        let names = self.read_directory().group_user_names();
        for chunk in names.chunks(GROUP_BATCH_SIZE) {
            let items = chunk
                .iter()
                .map(|user_name| BatchContactItem {
                    user_name: user_name.clone(),
                    encry_chat_room_id: String::new(),
                })
                .collect();
            let contacts = self.batch_get_contacts(items)?;

            let now = Utc::now().timestamp();
            let mut directory = self.write_directory();
            for raw in &contacts {
                if is_group(&raw.user_name) && directory.group(&raw.user_name).is_some() {
                    directory.upsert_group(raw, now);
                }
            }
        }
        debug!("resolved {} groups", names.len());
        Ok(())
    }

    /// One `webwxbatchgetcontact` call.
    pub(super) fn batch_get_contacts(&self, items: Vec<BatchContactItem>) -> Result<Vec<RawContact>> {
        let (url, request) = {
            let session = self.read_session();
            (
                session.batch_contact_url(&self.config.lang),
                BatchContactRequest::new(session.base_request(), items),
            )
        };
        let body = self
            .transport
            .post_json(&url, &serde_json::to_string(&request)?)?;
        let response: BatchContactResponse = decode("webwxbatchgetcontact", &body)?;
        Ok(response.contact_list)
    }

    /// Gender breakdown of one group's members.
    ///
    /// The group record is refreshed first, then its members are fetched in
    /// batches. A failed batch is skipped and counts nothing.
    pub fn member_stats(&self, group: &str) -> Result<MemberStats> {
        let record = self
            .batch_get_contacts(vec![BatchContactItem {
                user_name: group.to_string(),
                encry_chat_room_id: String::new(),
            }])?
            .into_iter()
            .find(|raw| raw.user_name == group)
            .ok_or_else(|| Error::UnknownContact(group.to_string()))?;
        self.write_directory()
            .upsert_group(&record, Utc::now().timestamp());

        let members = self.read_directory().member_user_names(group);
        let mut stats = MemberStats::default();
        for chunk in members.chunks(MEMBER_BATCH_SIZE) {
            let items = chunk
                .iter()
                .map(|user_name| BatchContactItem {
                    user_name: user_name.clone(),
                    encry_chat_room_id: group.to_string(),
                })
                .collect();
            match self.batch_get_contacts(items) {
                Ok(contacts) => {
                    for raw in &contacts {
                        stats.record(Sex::from(raw.sex));
                    }
                }
                Err(e) => warn!("member batch of {} failed: {}", group, e),
            }
        }
        Ok(stats)
    }
}
