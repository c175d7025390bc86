//! In-memory contact directory.
//!
//! Friends and groups are keyed by user-name. Two secondary maps index them by
//! display name, and every display name is unique within its map. The
//! directory itself does no I/O: remote renames it decides on are handed back
//! to the caller as [`Rename`] values.

use std::collections::HashMap;

use serde::Serialize;

use crate::protocol::response::RawContact;
use crate::types::{is_group, Friend, Group, GroupMember, Sex};

/// Marker inserted between a colliding name and its uniqueness token.
pub const COLLISION_MARKER: &str = "_$$_";

/// A remark the remote service should persist for a friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub user_name: String,
    pub remark_name: String,
}

/// Result of inserting one friend record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FriendChange {
    /// The user-name was not in the directory before.
    pub is_new: bool,
    /// Set when the display name had to be uniqued.
    pub rename: Option<Rename>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDirectory {
    friends: HashMap<String, Friend>,
    groups: HashMap<String, Group>,
    nick_friends: HashMap<String, String>,
    nick_groups: HashMap<String, String>,
}

/// First free variant of `base` in `taken`.
fn unique_name(base: &str, now_secs: i64, taken: &HashMap<String, String>) -> String {
    if !taken.contains_key(base) {
        return base.to_string();
    }
    let suffixed = format!("{base}{COLLISION_MARKER}{now_secs}");
    let mut candidate = suffixed.clone();
    let mut counter = 1;
    while taken.contains_key(&candidate) {
        candidate = format!("{suffixed}_{counter}");
        counter += 1;
    }
    candidate
}

/// Drop `name` from `index` if it still points at `user_name`.
fn release(index: &mut HashMap<String, String>, name: &str, user_name: &str) {
    if index.get(name).map(String::as_str) == Some(user_name) {
        index.remove(name);
    }
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh an individual contact.
    ///
    /// A friend whose resolved name did not change keeps the display name it
    /// was given earlier, so re-running a sync never renames anyone twice.
    pub fn insert_friend(&mut self, raw: &RawContact, now_secs: i64) -> FriendChange {
        let base = Friend::resolve_name(&raw.remark_name, &raw.nick_name);
        let previous = self.friends.get(&raw.user_name);
        let is_new = previous.is_none();

        let kept = previous
            .filter(|f| {
                f.base_name == base
                    && self.nick_friends.get(&f.display_name) == Some(&raw.user_name)
            })
            .map(|f| f.display_name.clone());

        let (display_name, assigned) = match kept {
            Some(name) => (name, false),
            None => {
                if let Some(old) = previous.map(|f| f.display_name.clone()) {
                    release(&mut self.nick_friends, &old, &raw.user_name);
                }
                if base.is_empty() {
                    (base.clone(), true)
                } else {
                    let name = unique_name(&base, now_secs, &self.nick_friends);
                    self.nick_friends.insert(name.clone(), raw.user_name.clone());
                    (name, true)
                }
            }
        };

        let rename = (assigned && display_name != base).then(|| Rename {
            user_name: raw.user_name.clone(),
            remark_name: display_name.clone(),
        });

        self.friends.insert(
            raw.user_name.clone(),
            Friend {
                user_name: raw.user_name.clone(),
                nick_name: raw.nick_name.clone(),
                display_name,
                base_name: base,
                remark_name: raw.remark_name.clone(),
                alias: raw.alias.clone(),
                city: raw.city.clone(),
                province: raw.province.clone(),
                signature: raw.signature.clone(),
                sex: Sex::from(raw.sex),
                verify_flag: raw.verify_flag,
                contact_flag: raw.contact_flag,
            },
        );

        FriendChange { is_new, rename }
    }

    /// Re-resolve a friend under a new remark name. `None` when the friend
    /// is unknown.
    pub fn set_remark(
        &mut self,
        user_name: &str,
        remark_name: &str,
        now_secs: i64,
    ) -> Option<FriendChange> {
        let friend = self.friends.get(user_name)?;
        let raw = RawContact {
            user_name: friend.user_name.clone(),
            nick_name: friend.nick_name.clone(),
            remark_name: remark_name.to_string(),
            alias: friend.alias.clone(),
            city: friend.city.clone(),
            province: friend.province.clone(),
            signature: friend.signature.clone(),
            sex: friend.sex.code(),
            verify_flag: friend.verify_flag,
            contact_flag: friend.contact_flag,
            ..Default::default()
        };
        Some(self.insert_friend(&raw, now_secs))
    }

    /// Register a group known only by its user-name. Existing entries are
    /// left alone.
    pub fn seed_group(&mut self, user_name: &str) {
        self.groups
            .entry(user_name.to_string())
            .or_insert_with(|| Group::new(user_name, "", 0));
    }

    /// Insert or refresh a group, merging any members the record carries.
    ///
    /// Colliding group names are uniqued locally only.
    pub fn upsert_group(&mut self, raw: &RawContact, now_secs: i64) {
        let user_name = raw.user_name.as_str();
        let previous_name = self.groups.get(user_name).map(|g| g.display_name.clone());
        let keep = self
            .groups
            .get(user_name)
            .filter(|g| {
                g.nick_name == raw.nick_name
                    && (raw.nick_name.is_empty()
                        || self.nick_groups.get(&g.display_name).map(String::as_str)
                            == Some(user_name))
            })
            .is_some();

        let display_name = if keep {
            previous_name.unwrap_or_default()
        } else {
            if let Some(old) = previous_name {
                release(&mut self.nick_groups, &old, user_name);
            }
            if raw.nick_name.is_empty() {
                String::new()
            } else {
                let name = unique_name(&raw.nick_name, now_secs, &self.nick_groups);
                self.nick_groups.insert(name.clone(), user_name.to_string());
                name
            }
        };

        let group = self
            .groups
            .entry(user_name.to_string())
            .or_insert_with(|| Group::new(user_name, "", 0));
        group.nick_name = raw.nick_name.clone();
        group.display_name = display_name;
        group.contact_flag = raw.contact_flag;
        for member in &raw.member_list {
            group.members.insert(
                member.user_name.clone(),
                GroupMember {
                    user_name: member.user_name.clone(),
                    nick_name: member.nick_name.clone(),
                    display_name: member.display_name.clone(),
                },
            );
        }
    }

    /// Route a record to the friend or group path by its user-name.
    /// Returns the friend outcome; groups report a default change.
    pub fn upsert(&mut self, raw: &RawContact, now_secs: i64) -> FriendChange {
        if is_group(&raw.user_name) {
            self.upsert_group(raw, now_secs);
            FriendChange::default()
        } else {
            self.insert_friend(raw, now_secs)
        }
    }

    /// Remove a friend or group. Returns whether anything was removed.
    pub fn remove(&mut self, user_name: &str) -> bool {
        if let Some(friend) = self.friends.remove(user_name) {
            release(&mut self.nick_friends, &friend.display_name, user_name);
            return true;
        }
        if let Some(group) = self.groups.remove(user_name) {
            release(&mut self.nick_groups, &group.display_name, user_name);
            return true;
        }
        false
    }

    pub fn friend(&self, user_name: &str) -> Option<&Friend> {
        self.friends.get(user_name)
    }

    pub fn group(&self, user_name: &str) -> Option<&Group> {
        self.groups.get(user_name)
    }

    pub fn friend_by_name(&self, name: &str) -> Option<&Friend> {
        self.nick_friends
            .get(name)
            .and_then(|user_name| self.friends.get(user_name))
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.nick_groups
            .get(name)
            .and_then(|user_name| self.groups.get(user_name))
    }

    pub fn group_member(&self, group: &str, member: &str) -> Option<&GroupMember> {
        self.groups.get(group)?.member(member)
    }

    /// Friends that are real people, ordered by user-name.
    pub fn personal_friends(&self) -> Vec<Friend> {
        let mut friends: Vec<Friend> = self
            .friends
            .values()
            .filter(|f| f.is_personal())
            .cloned()
            .collect();
        friends.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        friends
    }

    /// Every group user-name, sorted.
    pub fn group_user_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Member user-names of one group, sorted.
    pub fn member_user_names(&self, group: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .groups
            .get(group)
            .map(|g| g.members.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn friend_count(&self) -> usize {
        self.friends.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
