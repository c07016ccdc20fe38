//! Server records and link-local state.

use std::collections::HashSet;

use crate::id::{Sid, Uid};

/// Capability flags a peer may advertise at link time.
pub mod caps {
    /// Direct `KLINE` propagation.
    pub const KLN: &str = "KLN";
    /// Direct `UNKLINE` propagation.
    pub const UNKLN: &str = "UNKLN";
    /// Unified `BAN` command with absolute timestamps.
    pub const BAN: &str = "BAN";
    /// Extended user introduction.
    pub const EUID: &str = "EUID";
    /// Cluster-wide command routing.
    pub const CLUSTER: &str = "CLUSTER";
}

/// State attached to a directly-connected peer.
///
/// The transport is out of scope; outbound frames accumulate in `sendq`
/// and the embedding daemon drains them in order.
#[derive(Debug, Default)]
pub struct Link {
    /// Outbound frames, oldest first.
    pub sendq: Vec<String>,
    /// One-shot flag: the first ban burst for this peer has been sent.
    pub bans_negotiated: bool,
    /// Synthetic ban-source user introduced to this peer, if any.
    pub ban_agent: Option<Uid>,
    /// Error kinds already surfaced as operator notices for this peer.
    pub noticed: HashSet<&'static str>,
}

/// A server in the mesh.
#[derive(Debug)]
pub struct Server {
    /// Internal server ID.
    pub sid: Sid,
    /// Server name (`hub.straylight.net`).
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Capability flags advertised at link time.
    pub caps: HashSet<String>,
    /// Whether the server is still bursting to us.
    pub is_burst: bool,
    /// Directly-linked neighbor through which we learned of this server.
    pub location: Sid,
    /// Present iff this server is directly linked to us.
    pub link: Option<Link>,
}

impl Server {
    /// Create a server record; `location` is the direct neighbor it is
    /// reachable through (itself, for direct peers).
    pub fn new(sid: Sid, name: &str, location: Sid) -> Self {
        Self {
            sid,
            name: name.to_string(),
            description: String::new(),
            caps: HashSet::new(),
            is_burst: false,
            location,
            link: None,
        }
    }

    /// Whether the peer advertised a capability flag.
    pub fn has_cap(&self, cap: &str) -> bool {
        self.caps.contains(cap)
    }

    /// Queue an outbound frame, if this server is directly linked.
    pub fn send(&mut self, frame: String) {
        if let Some(link) = &mut self.link {
            link.sendq.push(frame);
        }
    }
}
