//! Access control for groups and users
//!
//! A configured whitelist is the sole criterion for its scope and shadows
//! the blacklist; the blacklist applies only when no whitelist exists.
//! Entries match by numeric id or by name, either being sufficient.

use crate::config::{AccessEntry, Settings};
use tracing::warn;

#[derive(Debug, Default, Clone)]
struct AccessList {
    whitelist: Vec<AccessEntry>,
    blacklist: Vec<AccessEntry>,
}

impl AccessList {
    fn allows(&self, id: i64, name: Option<&str>) -> bool {
        if !self.whitelist.is_empty() {
            return contains(&self.whitelist, id, name);
        }
        if !self.blacklist.is_empty() {
            return !contains(&self.blacklist, id, name);
        }
        true
    }
}

fn contains(entries: &[AccessEntry], id: i64, name: Option<&str>) -> bool {
    entries.iter().any(|entry| match entry {
        AccessEntry::Id(listed) => *listed == id,
        AccessEntry::Name(listed) => name.is_some_and(|n| n == listed),
    })
}

/// Whitelist/blacklist gate for group chats and individual senders
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    groups: AccessList,
    users: AccessList,
}

impl AccessPolicy {
    /// Build the policy from settings, warning when a blacklist is shadowed
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        if !settings.group_whitelist.is_empty() && !settings.group_blacklist.is_empty() {
            warn!("Both group whitelist and blacklist configured; the blacklist will be ignored");
        }
        if !settings.user_whitelist.is_empty() && !settings.user_blacklist.is_empty() {
            warn!("Both user whitelist and blacklist configured; the blacklist will be ignored");
        }
        Self {
            groups: AccessList {
                whitelist: settings.group_whitelist.clone(),
                blacklist: settings.group_blacklist.clone(),
            },
            users: AccessList {
                whitelist: settings.user_whitelist.clone(),
                blacklist: settings.user_blacklist.clone(),
            },
        }
    }

    /// True when the group chat may use the bot
    #[must_use]
    pub fn group_allowed(&self, chat_id: i64, chat_title: Option<&str>) -> bool {
        self.groups.allows(chat_id, chat_title)
    }

    /// True when the sender may use the bot
    #[must_use]
    pub fn user_allowed(&self, user_id: i64, user_name: &str) -> bool {
        self.users.allows(user_id, Some(user_name))
    }
}
