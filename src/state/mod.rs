//! Mesh state: the pool, channels, users, servers, and mode machinery.

pub mod apply;
pub mod channel;
pub mod modes;
pub mod pool;
pub mod server;
pub mod user;

use crate::event::{HookSet, NamesEntry};
use crate::id::{Sid, Uid};
use crate::state::modes::ModeTable;
use crate::state::pool::Pool;
use crate::util::irc_lower;

/// Something that can originate a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A user, by UID.
    User(Uid),
    /// A server, by SID.
    Server(Sid),
}

impl Actor {
    /// The TS6 source token for this actor.
    pub fn to_ts6(self) -> String {
        match self {
            Actor::User(uid) => uid.to_ts6(),
            Actor::Server(sid) => sid.to_ts6(),
        }
    }
}

/// Assemble NAMES reply bodies for a channel.
///
/// Members are grouped into lines of at most `width` characters measured
/// over the prefix-decorated nicks. With `multi_prefix`, every held
/// prefix is shown in descending level order; otherwise only the
/// highest. The `show_in_names` and `names_character` events may hide a
/// member or rewrite its prefixes.
pub fn names_lines(
    pool: &Pool,
    table: &ModeTable,
    hooks: &HookSet,
    channel_name: &str,
    multi_prefix: bool,
    width: usize,
) -> Vec<String> {
    let key = irc_lower(channel_name);
    let Some(channel) = pool.channel(&key) else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut current = String::new();
    for &uid in channel.members() {
        let Some(user) = pool.user(uid) else {
            continue;
        };
        let mut prefixes: String = channel
            .statuses_of(uid, table)
            .iter()
            .filter_map(|name| table.status_info(name))
            .map(|s| s.prefix)
            .collect();
        if !multi_prefix {
            prefixes.truncate(1);
        }

        let mut entry = NamesEntry {
            uid,
            channel: key.clone(),
            prefixes,
            visible: true,
        };
        hooks.show_in_names.fire(&mut entry);
        if !entry.visible {
            continue;
        }
        hooks.names_character.fire(&mut entry);

        let decorated = format!("{}{}", entry.prefixes, user.nick);
        if !current.is_empty() && current.len() + 1 + decorated.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&decorated);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
