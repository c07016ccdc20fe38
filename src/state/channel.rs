//! Per-channel state.
//!
//! A channel owns its creation timestamp, an ordered member list, the mode
//! map, per-list entries, and the topic record. Members are stored as UIDs;
//! the pool resolves them back to users. Everything here is a primitive
//! mutation; permission checks and TS rules live in the applicator and the
//! SJOIN handler.

use std::collections::BTreeMap;

use crate::id::Uid;
use crate::state::modes::{ModeChange, ModeKind, ModeTable};
use crate::util::{irc_eq, mask_match};

/// One entry of a list mode (ban, except, invex, access).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// The mask (or `status:mask` for access lists).
    pub mask: String,
    /// Who set it (nick or server name).
    pub set_by: String,
    /// When it was set.
    pub set_at: i64,
}

/// Channel topic record. Absent iff the topic text is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Topic text; never empty.
    pub text: String,
    /// Who set it.
    pub set_by: String,
    /// When it was set.
    pub set_at: i64,
    /// TS6 SID of the server it came from.
    pub source: String,
}

/// Stored value of one channel mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeValue {
    /// A set flag mode.
    Simple {
        /// When it was set.
        since: i64,
    },
    /// A parametered mode (including the key).
    Param {
        /// Current parameter.
        param: String,
        /// When it was set.
        since: i64,
    },
    /// A mask list.
    List {
        /// Entries, oldest first, unique by mask.
        entries: Vec<ListEntry>,
    },
    /// A status mode's holders.
    Status {
        /// Holders in join order.
        users: Vec<Uid>,
    },
}

/// A channel.
#[derive(Debug)]
pub struct Channel {
    /// Casemapped channel name.
    pub name: String,
    /// Channel timestamp; lower is older and wins conflicts.
    pub time: i64,
    users: Vec<Uid>,
    modes: BTreeMap<String, ModeValue>,
    /// Topic record, absent when no topic is set.
    pub topic: Option<Topic>,
}

impl Channel {
    /// Create a channel with the given casemapped name and timestamp.
    pub fn new(name: &str, time: i64) -> Self {
        Self {
            name: name.to_string(),
            time,
            users: Vec::new(),
            modes: BTreeMap::new(),
            topic: None,
        }
    }

    // === membership ===

    /// Members in join order.
    pub fn members(&self) -> &[Uid] {
        &self.users
    }

    /// Whether `uid` is on the channel.
    pub fn has(&self, uid: Uid) -> bool {
        self.users.contains(&uid)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the channel has no members.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Add a member. Returns `false` if already present.
    pub fn add(&mut self, uid: Uid) -> bool {
        if self.has(uid) {
            return false;
        }
        self.users.push(uid);
        true
    }

    /// Remove a member and purge them from every status list.
    ///
    /// Returns `false` if they were not present.
    pub fn remove(&mut self, uid: Uid) -> bool {
        let Some(pos) = self.users.iter().position(|u| *u == uid) else {
            return false;
        };
        self.users.remove(pos);
        for value in self.modes.values_mut() {
            if let ModeValue::Status { users } = value {
                users.retain(|u| *u != uid);
            }
        }
        true
    }

    // === simple and parametered modes ===

    /// Whether a non-list, non-status mode is set.
    pub fn is_set(&self, name: &str) -> bool {
        matches!(
            self.modes.get(name),
            Some(ModeValue::Simple { .. } | ModeValue::Param { .. })
        )
    }

    /// Parameter of a set parametered mode.
    pub fn param_of(&self, name: &str) -> Option<&str> {
        match self.modes.get(name) {
            Some(ModeValue::Param { param, .. }) => Some(param),
            _ => None,
        }
    }

    /// Set a flag or parametered mode.
    pub fn set_mode(&mut self, name: &str, param: Option<&str>, now: i64) {
        let value = match param {
            Some(p) => ModeValue::Param {
                param: p.to_string(),
                since: now,
            },
            None => ModeValue::Simple { since: now },
        };
        self.modes.insert(name.to_string(), value);
    }

    /// Unset a flag or parametered mode. No-op on lists and statuses.
    pub fn unset_mode(&mut self, name: &str) {
        if self.is_set(name) {
            self.modes.remove(name);
        }
    }

    // === list modes ===

    /// Entries of a list mode; empty when none.
    pub fn list_entries(&self, name: &str) -> &[ListEntry] {
        match self.modes.get(name) {
            Some(ModeValue::List { entries }) => entries,
            _ => &[],
        }
    }

    /// Add a list entry. Entries are unique by mask; returns `false`
    /// when the mask is already present.
    pub fn add_to_list(&mut self, name: &str, entry: ListEntry) -> bool {
        let value = self
            .modes
            .entry(name.to_string())
            .or_insert(ModeValue::List {
                entries: Vec::new(),
            });
        let ModeValue::List { entries } = value else {
            return false;
        };
        if entries.iter().any(|e| irc_eq(&e.mask, &entry.mask)) {
            return false;
        }
        entries.push(entry);
        true
    }

    /// Remove a list entry by mask. Returns `false` when absent.
    pub fn remove_from_list(&mut self, name: &str, mask: &str) -> bool {
        let Some(ModeValue::List { entries }) = self.modes.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| !irc_eq(&e.mask, mask));
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.modes.remove(name);
        }
        removed
    }

    /// Whether the list holds exactly this mask.
    pub fn list_has(&self, name: &str, mask: &str) -> bool {
        self.list_entries(name).iter().any(|e| irc_eq(&e.mask, mask))
    }

    /// Whether any entry of the list glob-matches `target`.
    pub fn list_matches(&self, name: &str, target: &str) -> bool {
        self.list_entries(name)
            .iter()
            .any(|e| mask_match(&e.mask, target))
    }

    // === status modes ===

    /// Grant a status to a member. The holder must already be on the
    /// channel; returns `false` otherwise or when already held.
    pub fn grant_status(&mut self, name: &str, uid: Uid) -> bool {
        if !self.has(uid) {
            return false;
        }
        let value = self
            .modes
            .entry(name.to_string())
            .or_insert(ModeValue::Status { users: Vec::new() });
        let ModeValue::Status { users } = value else {
            return false;
        };
        if users.contains(&uid) {
            return false;
        }
        users.push(uid);
        true
    }

    /// Revoke a status. Returns `false` when not held.
    pub fn revoke_status(&mut self, name: &str, uid: Uid) -> bool {
        let Some(ModeValue::Status { users }) = self.modes.get_mut(name) else {
            return false;
        };
        let before = users.len();
        users.retain(|u| *u != uid);
        let removed = users.len() != before;
        if users.is_empty() {
            self.modes.remove(name);
        }
        removed
    }

    /// Holders of a status, in join order.
    pub fn status_holders(&self, name: &str) -> &[Uid] {
        match self.modes.get(name) {
            Some(ModeValue::Status { users }) => users,
            _ => &[],
        }
    }

    /// Status names held by `uid`, highest level first.
    pub fn statuses_of<'t>(&self, uid: Uid, table: &'t ModeTable) -> Vec<&'t str> {
        table
            .statuses_desc()
            .into_iter()
            .filter(|name| self.status_holders(name).contains(&uid))
            .collect()
    }

    /// Highest status level held by `uid`, if any.
    pub fn highest_level(&self, uid: Uid, table: &ModeTable) -> Option<u8> {
        self.statuses_of(uid, table)
            .first()
            .and_then(|n| table.status_info(n))
            .map(|s| s.level)
    }

    // === timestamps and topic ===

    /// Lower the channel timestamp to `min(time, t)`.
    ///
    /// Never raises it. Unless `ignore_modes` is set, a lowered timestamp
    /// wipes every mode (the callers that merge remote state pass `true`
    /// and sort out the wipe themselves).
    pub fn take_lower_time(&mut self, t: i64, ignore_modes: bool) {
        if t >= self.time {
            return;
        }
        self.time = t;
        if !ignore_modes {
            self.modes.clear();
        }
    }

    /// Replace the topic. Empty text clears the record.
    pub fn do_topic(&mut self, text: &str, set_by: &str, set_at: i64, source: &str) {
        if text.is_empty() {
            self.topic = None;
        } else {
            self.topic = Some(Topic {
                text: text.to_string(),
                set_by: set_by.to_string(),
                set_at,
                source: source.to_string(),
            });
        }
    }

    // === snapshots for SJOIN / burst ===

    /// Current flag and parametered modes as positive changes.
    pub fn simple_mode_changes(&self, table: &ModeTable) -> Vec<ModeChange> {
        self.modes
            .iter()
            .filter_map(|(name, value)| match value {
                ModeValue::Simple { .. } => Some(ModeChange::new(name, true, None)),
                ModeValue::Param { param, .. } => {
                    Some(ModeChange::new(name, true, Some(param)))
                }
                _ => None,
            })
            .filter(|c| {
                !matches!(
                    table.kind_of(&c.name),
                    Some(ModeKind::List | ModeKind::Status) | None
                )
            })
            .collect()
    }

    /// Current statuses as positive changes carrying TS6 UID parameters.
    pub fn status_changes(&self, table: &ModeTable) -> Vec<ModeChange> {
        let mut out = Vec::new();
        for name in table.statuses_desc() {
            for uid in self.status_holders(name) {
                out.push(ModeChange::new(name, true, Some(&uid.to_ts6())));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Sid;

    fn uid(n: u64) -> Uid {
        Uid { sid: Sid(1), n }
    }

    #[test]
    fn test_membership_order() {
        let mut c = Channel::new("#test", 1000);
        assert!(c.add(uid(1)));
        assert!(c.add(uid(2)));
        assert!(!c.add(uid(1)));
        assert_eq!(c.members(), &[uid(1), uid(2)]);
    }

    #[test]
    fn test_remove_purges_status() {
        let mut c = Channel::new("#test", 1000);
        c.add(uid(1));
        c.grant_status("op", uid(1));
        c.grant_status("voice", uid(1));
        assert!(c.remove(uid(1)));
        assert!(c.status_holders("op").is_empty());
        assert!(c.status_holders("voice").is_empty());
        assert!(!c.remove(uid(1)));
    }

    #[test]
    fn test_status_requires_membership() {
        let mut c = Channel::new("#test", 1000);
        assert!(!c.grant_status("op", uid(1)));
        c.add(uid(1));
        assert!(c.grant_status("op", uid(1)));
        assert!(!c.grant_status("op", uid(1)));
    }

    #[test]
    fn test_list_unique_by_mask() {
        let mut c = Channel::new("#test", 1000);
        let e = ListEntry {
            mask: "*!*@Spam.NET".into(),
            set_by: "oper".into(),
            set_at: 5,
        };
        assert!(c.add_to_list("ban", e.clone()));
        // Same mask under casemapping.
        let dup = ListEntry {
            mask: "*!*@spam.net".into(),
            ..e
        };
        assert!(!c.add_to_list("ban", dup));
        assert!(c.list_has("ban", "*!*@spam.net"));
        assert!(c.list_matches("ban", "nick!user@spam.net"));
        assert!(c.remove_from_list("ban", "*!*@SPAM.net"));
        assert!(c.list_entries("ban").is_empty());
    }

    #[test]
    fn test_take_lower_time() {
        let mut c = Channel::new("#test", 1000);
        c.set_mode("moderated", None, 1000);
        c.take_lower_time(1200, false);
        assert_eq!(c.time, 1000);
        assert!(c.is_set("moderated"));
        c.take_lower_time(900, true);
        assert_eq!(c.time, 900);
        assert!(c.is_set("moderated"));
        c.take_lower_time(800, false);
        assert_eq!(c.time, 800);
        assert!(!c.is_set("moderated"));
    }

    #[test]
    fn test_topic_record() {
        let mut c = Channel::new("#test", 1000);
        c.do_topic("hello", "nick", 1234, "001");
        assert_eq!(c.topic.as_ref().unwrap().text, "hello");
        c.do_topic("", "nick", 1240, "001");
        assert!(c.topic.is_none());
    }

    #[test]
    fn test_snapshots() {
        let t = ModeTable::ts6_default();
        let mut c = Channel::new("#test", 1000);
        c.set_mode("no_ext", None, 1000);
        c.set_mode("key", Some("sesame"), 1000);
        c.add(uid(1));
        c.grant_status("op", uid(1));
        let simple = c.simple_mode_changes(&t);
        assert!(simple.contains(&ModeChange::new("no_ext", true, None)));
        assert!(simple.contains(&ModeChange::new("key", true, Some("sesame"))));
        let status = c.status_changes(&t);
        assert_eq!(status, vec![ModeChange::new("op", true, Some("001AAAAAA"))]);
    }

    #[test]
    fn test_highest_level() {
        let t = ModeTable::ts6_default();
        let mut c = Channel::new("#test", 1000);
        c.add(uid(1));
        c.grant_status("voice", uid(1));
        assert_eq!(c.highest_level(uid(1), &t), Some(0));
        c.grant_status("op", uid(1));
        assert_eq!(c.highest_level(uid(1), &t), Some(2));
        assert_eq!(c.statuses_of(uid(1), &t), vec!["op", "voice"]);
    }
}
