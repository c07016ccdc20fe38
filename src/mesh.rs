//! The engine aggregate.
//!
//! One [`Mesh`] holds everything a handler needs: the pool, the hook
//! tables, the mode registry, limits, and the ban store. It is passed
//! explicitly into every entry point; the process runs handlers on a
//! single scheduler, so no interior locking exists anywhere below this
//! type, and a frame's side effects commit atomically within one call.

use std::collections::HashSet;

use tracing::warn;

use crate::bans::BanStore;
use crate::config::{Config, Limits};
use crate::error::ProtoError;
use crate::event::HookSet;
use crate::id::{Sid, UidAllocator};
use crate::state::apply::ModeHooks;
use crate::state::modes::ModeTable;
use crate::state::pool::Pool;
use crate::state::server::{Link, Server};

/// Top-level engine state.
#[derive(Debug)]
pub struct Mesh {
    /// Our server ID.
    pub me: Sid,
    /// Our server name.
    pub name: String,
    /// Every server, user, and channel we know about.
    pub pool: Pool,
    /// Named engine events.
    pub hooks: HookSet,
    /// Registered channel mode blocks.
    pub mode_hooks: ModeHooks,
    /// Our mode letter table.
    pub modes: ModeTable,
    /// Engine limits.
    pub limits: Limits,
    /// Global ban table.
    pub bans: BanStore,
    /// UID allocator for locally-introduced users (including ban agents).
    pub uids: UidAllocator,
    /// Operator notices awaiting delivery by the embedding daemon.
    pub notices: Vec<String>,
    noticed: HashSet<(u32, &'static str)>,
}

impl Mesh {
    /// Build an engine from configuration.
    pub fn new(config: &Config) -> Result<Self, ProtoError> {
        let me = Sid::from_ts6(&config.server.sid)
            .ok_or_else(|| ProtoError::BadParameter(format!("bad sid: {}", config.server.sid)))?;
        Ok(Self {
            me,
            name: config.server.name.clone(),
            pool: Pool::new(),
            hooks: HookSet::default(),
            mode_hooks: ModeHooks::default(),
            modes: ModeTable::ts6_default(),
            limits: config.limits.clone(),
            bans: BanStore::new(),
            uids: UidAllocator::new(me),
            notices: Vec::new(),
            noticed: HashSet::new(),
        })
    }

    /// Register a directly-linked peer with the given capability flags.
    pub fn link_peer(&mut self, sid: Sid, name: &str, caps: &[&str]) {
        let mut server = Server::new(sid, name, sid);
        server.caps = caps.iter().map(|c| c.to_string()).collect();
        server.is_burst = true;
        server.link = Some(Link::default());
        self.pool.add_server(server);
    }

    /// Mode table to use when talking to `_peer`.
    ///
    /// Every TS6 peer currently shares our table; the indirection is the
    /// seam where per-implementation letter tables plug in.
    pub fn perspective(&self, _peer: Sid) -> &ModeTable {
        &self.modes
    }

    /// Record an operator notice about a peer, at most once per
    /// (peer, error kind) pair.
    pub fn server_notice(&mut self, peer: Sid, err: &ProtoError) {
        if !self.noticed.insert((peer.0, err.error_code())) {
            return;
        }
        let text = format!("from {}: {}", peer.to_ts6(), err);
        warn!(peer = %peer, error = %err, "protocol notice");
        self.notices.push(text);
    }

    /// Drain queued outbound frames for one peer, in emission order.
    pub fn take_sendq(&mut self, peer: Sid) -> Vec<String> {
        self.pool
            .server_mut(peer)
            .and_then(|s| s.link.as_mut())
            .map(|l| std::mem::take(&mut l.sendq))
            .unwrap_or_default()
    }

    /// Take a user off a channel, firing `channel_part` and tearing the
    /// channel down if it empties out.
    pub fn part_user(&mut self, uid: crate::id::Uid, channel: &str, reason: Option<&str>) -> bool {
        if !self.pool.part(uid, channel) {
            return false;
        }
        self.hooks.channel_part.fire(&mut crate::event::ChannelPart {
            uid,
            channel: channel.to_string(),
            reason: reason.map(str::to_string),
        });
        self.pool.destroy_maybe(channel, &self.hooks);
        true
    }

    /// Remove a user from a channel on someone else's authority, firing
    /// `channel_kick`.
    pub fn kick_user(
        &mut self,
        source: crate::state::Actor,
        uid: crate::id::Uid,
        channel: &str,
        reason: &str,
    ) -> bool {
        if !self.pool.part(uid, channel) {
            return false;
        }
        self.hooks.channel_kick.fire(&mut crate::event::ChannelKick {
            source,
            uid,
            channel: channel.to_string(),
            reason: reason.to_string(),
        });
        self.pool.destroy_maybe(channel, &self.hooks);
        true
    }

    /// Periodic maintenance pass: prune bans past their lifetime.
    ///
    /// Driven by the embedding daemon's timer; expiry itself is checked
    /// lazily against explicit `now` values, so the tick cadence only
    /// bounds how long dead records linger.
    pub fn tick(&mut self) -> usize {
        self.bans.prune(crate::util::now_unix())
    }

    /// Ask the `user.can_message` listeners whether delivery may proceed.
    pub fn can_message(&self, from: crate::id::Uid, target: &str) -> bool {
        let mut payload = crate::event::CanMessage {
            from,
            target: target.to_string(),
            blocked: false,
        };
        self.hooks.user_can_message.fire(&mut payload);
        !payload.blocked
    }
}
