//! User records.

use std::collections::HashSet;

use crate::id::{Sid, Uid};

/// A user anywhere on the mesh.
#[derive(Debug)]
pub struct User {
    /// Globally-unique identifier.
    pub uid: Uid,
    /// Nickname.
    pub nick: String,
    /// Ident (username).
    pub ident: String,
    /// Real hostname.
    pub host: String,
    /// Displayed (possibly cloaked) hostname.
    pub cloak: String,
    /// IP address as text, if known.
    pub ip: Option<String>,
    /// Realname (GECOS).
    pub real: String,
    /// Services account, if identified.
    pub account: Option<String>,
    /// User mode letters.
    pub modes: HashSet<char>,
    /// Nick timestamp.
    pub nick_time: i64,
    /// Origin server.
    pub server: Sid,
    /// Directly-linked neighbor via which we learned of this user.
    pub location: Sid,
    /// Channels the user is on (casemapped names).
    pub channels: Vec<String>,
}

impl User {
    /// `ident@host` tuple a K-line mask is evaluated against.
    pub fn kline_tuple_host(&self) -> String {
        format!("{}@{}", self.ident, self.host)
    }

    /// `ident@ip` tuple, when the IP is known.
    pub fn kline_tuple_ip(&self) -> Option<String> {
        self.ip.as_ref().map(|ip| format!("{}@{}", self.ident, ip))
    }

    /// Whether the user is on a channel (casemapped name).
    pub fn on_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c == name)
    }
}
