//! Contact records held by the directory.
//!
//! Every contact is keyed by the service's opaque user-name identifier.
//! Group identifiers carry the reserved [`GROUP_PREFIX`].

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use serde::Serialize;

/// Prefix marking a group user-name.
pub const GROUP_PREFIX: &str = "@@";

/// `VerifyFlag` bit set on official/brand accounts.
pub const VERIFY_FLAG_OFFICIAL: i64 = 8;

lazy_static! {
    /// Built-in service accounts that never represent a real person.
    pub static ref SPECIAL_USERS: HashSet<&'static str> = [
        "newsapp",
        "fmessage",
        "filehelper",
        "weibo",
        "qqmail",
        "tmessage",
        "qmessage",
        "qqsync",
        "floatbottle",
        "lbsapp",
        "shakeapp",
        "medianote",
        "qqfriend",
        "readerapp",
        "blogapp",
        "facebookapp",
        "masssendapp",
        "meishiapp",
        "feedsapp",
        "voip",
        "blogappweixin",
        "weixin",
        "brandsessionholder",
        "weixinreminder",
        "wxid_novlwrv3lqwv11",
        "gh_22b87fa7cb3c",
        "officialaccounts",
        "notification_messages",
        "wxitil",
        "userexperience_alarm",
        "mphelper",
    ]
    .into_iter()
    .collect();
}

/// Whether a user-name identifies a group.
pub fn is_group(user_name: &str) -> bool {
    user_name.starts_with(GROUP_PREFIX)
}

/// Gender as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Sex {
    #[default]
    Unknown,
    Male,
    Female,
}

impl From<i64> for Sex {
    fn from(code: i64) -> Self {
        match code {
            1 => Sex::Male,
            2 => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

impl Sex {
    pub fn code(self) -> i64 {
        match self {
            Sex::Unknown => 0,
            Sex::Male => 1,
            Sex::Female => 2,
        }
    }
}

/// An individual contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Friend {
    pub user_name: String,
    pub nick_name: String,
    /// Name the friend is addressed by; unique within the directory.
    pub display_name: String,
    /// Remark name or nick name as received, before any uniquing.
    pub base_name: String,
    pub remark_name: String,
    pub alias: String,
    pub city: String,
    pub province: String,
    pub signature: String,
    pub sex: Sex,
    pub verify_flag: i64,
    pub contact_flag: i64,
}

impl Friend {
    /// Name the contact resolves to: the remark when set, otherwise the nick.
    pub fn resolve_name(remark_name: &str, nick_name: &str) -> String {
        if remark_name.is_empty() {
            nick_name.to_string()
        } else {
            remark_name.to_string()
        }
    }

    pub fn is_official(&self) -> bool {
        self.verify_flag & VERIFY_FLAG_OFFICIAL != 0
    }

    pub fn is_special(&self) -> bool {
        SPECIAL_USERS.contains(self.user_name.as_str())
    }

    /// A real person, neither a service account nor an official account.
    pub fn is_personal(&self) -> bool {
        !self.is_official() && !self.is_special()
    }
}

/// A member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub user_name: String,
    pub nick_name: String,
    /// Group-specific display name, often empty.
    pub display_name: String,
}

impl GroupMember {
    /// Best name to show for the member inside the group.
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.nick_name
        } else {
            &self.display_name
        }
    }
}

/// A group and its resolved members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Group {
    pub user_name: String,
    pub nick_name: String,
    /// Name the group is addressed by; unique within the directory.
    pub display_name: String,
    pub contact_flag: i64,
    pub members: HashMap<String, GroupMember>,
}

impl Group {
    pub fn new(user_name: impl Into<String>, nick_name: impl Into<String>, contact_flag: i64) -> Self {
        let nick_name = nick_name.into();
        Self {
            user_name: user_name.into(),
            display_name: nick_name.clone(),
            nick_name,
            contact_flag,
            members: HashMap::new(),
        }
    }

    pub fn member(&self, user_name: &str) -> Option<&GroupMember> {
        self.members.get(user_name)
    }
}

/// Gender breakdown of a group's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct MemberStats {
    pub male: usize,
    pub female: usize,
    pub unknown: usize,
}

impl MemberStats {
    pub fn record(&mut self, sex: Sex) {
        match sex {
            Sex::Male => self.male += 1,
            Sex::Female => self.female += 1,
            Sex::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.male + self.female + self.unknown
    }
}
