//! The pool: every server, user, and channel we know about.
//!
//! Channel/user membership is a cyclic relation; both sides store the
//! other's identifier and resolve through the pool, so deleting either
//! side can never leave a dangling reference alive past the next lookup.
//! The [`Pool::join`] / [`Pool::part`] / [`Pool::remove_user`] operations
//! always fix both edges.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::ProtoError;
use crate::event::{CanDestroy, HookSet};
use crate::id::{Sid, Uid};
use crate::state::channel::Channel;
use crate::state::server::Server;
use crate::state::user::User;
use crate::util::{irc_eq, irc_lower};

/// Process-wide object pool.
#[derive(Debug, Default)]
pub struct Pool {
    servers: HashMap<u32, Server>,
    users: HashMap<Uid, User>,
    channels: HashMap<String, Channel>,
}

impl Pool {
    /// Empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    // === servers ===

    /// Register a server.
    pub fn add_server(&mut self, server: Server) {
        self.servers.insert(server.sid.0, server);
    }

    /// Look up a server.
    pub fn server(&self, sid: Sid) -> Option<&Server> {
        self.servers.get(&sid.0)
    }

    /// Look up a server mutably.
    pub fn server_mut(&mut self, sid: Sid) -> Option<&mut Server> {
        self.servers.get_mut(&sid.0)
    }

    /// SIDs of directly-linked peers.
    pub fn linked_sids(&self) -> Vec<Sid> {
        self.servers
            .values()
            .filter(|s| s.link.is_some())
            .map(|s| s.sid)
            .collect()
    }

    /// Queue a frame on one peer's send queue.
    pub fn send_to(&mut self, sid: Sid, frame: &str) {
        if let Some(server) = self.server_mut(sid) {
            server.send(frame.to_string());
        }
    }

    /// Queue a frame on every linked peer except `except`.
    pub fn broadcast_except(&mut self, frame: &str, except: Option<Sid>) {
        for server in self.servers.values_mut() {
            if server.link.is_some() && Some(server.sid) != except {
                server.send(frame.to_string());
            }
        }
    }

    // === users ===

    /// Register a user; fails on a duplicate UID.
    pub fn add_user(&mut self, user: User) -> Result<(), ProtoError> {
        if self.users.contains_key(&user.uid) {
            return Err(ProtoError::UidCollision(user.uid.to_ts6()));
        }
        self.users.insert(user.uid, user);
        Ok(())
    }

    /// Look up a user.
    pub fn user(&self, uid: Uid) -> Option<&User> {
        self.users.get(&uid)
    }

    /// Look up a user mutably.
    pub fn user_mut(&mut self, uid: Uid) -> Option<&mut User> {
        self.users.get_mut(&uid)
    }

    /// Case-insensitive nickname lookup.
    pub fn user_by_nick(&self, nick: &str) -> Option<&User> {
        self.users.values().find(|u| irc_eq(&u.nick, nick))
    }

    /// All users.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Remove a user, breaking every membership edge.
    pub fn remove_user(&mut self, uid: Uid) -> Option<User> {
        let user = self.users.remove(&uid)?;
        for chan in &user.channels {
            if let Some(channel) = self.channels.get_mut(chan) {
                channel.remove(uid);
            }
        }
        Some(user)
    }

    // === channels ===

    /// Look up a channel by name (any case).
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_lower(name))
    }

    /// Look up a channel mutably.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&irc_lower(name))
    }

    /// Fetch or create a channel; a new channel adopts `ts`.
    ///
    /// Returns the casemapped name and whether it was created.
    pub fn get_or_create_channel(&mut self, name: &str, ts: i64) -> (String, bool) {
        let key = irc_lower(name);
        let created = !self.channels.contains_key(&key);
        if created {
            self.channels.insert(key.clone(), Channel::new(&key, ts));
            debug!(channel = %key, ts, "created channel");
        }
        (key, created)
    }

    /// All channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    // === membership (both edges) ===

    /// Put a user on a channel. Returns `false` if either side is
    /// missing or they were already joined.
    pub fn join(&mut self, uid: Uid, name: &str) -> bool {
        let key = irc_lower(name);
        let Some(channel) = self.channels.get_mut(&key) else {
            return false;
        };
        let Some(user) = self.users.get_mut(&uid) else {
            return false;
        };
        if !channel.add(uid) {
            return false;
        }
        user.channels.push(key);
        true
    }

    /// Take a user off a channel, fixing both edges.
    pub fn part(&mut self, uid: Uid, name: &str) -> bool {
        let key = irc_lower(name);
        let Some(channel) = self.channels.get_mut(&key) else {
            return false;
        };
        if !channel.remove(uid) {
            return false;
        }
        if let Some(user) = self.users.get_mut(&uid) {
            user.channels.retain(|c| *c != key);
        }
        true
    }

    /// Drop the channel iff it has no members and no listener vetoes.
    pub fn destroy_maybe(&mut self, name: &str, hooks: &HookSet) -> bool {
        let key = irc_lower(name);
        let Some(channel) = self.channels.get(&key) else {
            return false;
        };
        if !channel.is_empty() {
            return false;
        }
        let mut payload = CanDestroy {
            channel: key.clone(),
            veto: false,
        };
        hooks.can_destroy.fire(&mut payload);
        if payload.veto {
            return false;
        }
        self.channels.remove(&key);
        debug!(channel = %key, "destroyed empty channel");
        true
    }

    // === link teardown ===

    /// Tear down a direct peer: the server itself, every server behind
    /// it, and every user located through it.
    pub fn disconnect_server(&mut self, sid: Sid, reason: &str) {
        info!(sid = %sid, reason, "disconnecting server");
        let gone_users: Vec<Uid> = self
            .users
            .values()
            .filter(|u| u.location == sid)
            .map(|u| u.uid)
            .collect();
        for uid in gone_users {
            self.remove_user(uid);
        }
        self.servers
            .retain(|_, s| s.sid != sid && s.location != sid);
    }
}
