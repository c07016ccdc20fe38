//! Synchronous event dispatch.
//!
//! Listeners for an event run in registration order on the caller's
//! stack; a listener may stop propagation, which short-circuits the
//! rest. The named events of the engine are the fields of [`HookSet`],
//! each with its own typed payload, so handlers never downcast.

use crate::id::{Sid, Uid};
use crate::state::Actor;

/// Listener verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep calling the remaining listeners.
    Continue,
    /// Short-circuit: remaining listeners are skipped.
    Stop,
}

/// An ordered list of listeners for one event.
pub struct Hooks<T> {
    listeners: Vec<Box<dyn Fn(&mut T) -> Flow>>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<T> Hooks<T> {
    /// Append a listener. Listeners fire in registration order.
    pub fn on<F>(&mut self, f: F)
    where
        F: Fn(&mut T) -> Flow + 'static,
    {
        self.listeners.push(Box::new(f));
    }

    /// Fire the event. Returns `true` if a listener stopped propagation.
    pub fn fire(&self, payload: &mut T) -> bool {
        for l in &self.listeners {
            if l(payload) == Flow::Stop {
                return true;
            }
        }
        false
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> std::fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hooks({} listeners)", self.listeners.len())
    }
}

/// `user.new`: a user finished introduction.
#[derive(Debug)]
pub struct UserNew {
    /// The new user.
    pub uid: Uid,
}

/// `user.can_message`: veto point for message delivery.
#[derive(Debug)]
pub struct CanMessage {
    /// Message source.
    pub from: Uid,
    /// Nick or channel the message is addressed to.
    pub target: String,
    /// Set by a listener to block delivery.
    pub blocked: bool,
}

/// `user_joined` / `channel_join`: a user entered a channel.
#[derive(Debug)]
pub struct UserJoined {
    /// Joining user.
    pub uid: Uid,
    /// Channel name (casemapped).
    pub channel: String,
}

/// `channel_part`: a user left a channel.
#[derive(Debug)]
pub struct ChannelPart {
    /// Parting user.
    pub uid: Uid,
    /// Channel name (casemapped).
    pub channel: String,
    /// Part reason, if any.
    pub reason: Option<String>,
}

/// `channel_kick`: a user was removed by someone else.
#[derive(Debug)]
pub struct ChannelKick {
    /// Who performed the kick.
    pub source: Actor,
    /// The removed user.
    pub uid: Uid,
    /// Channel name (casemapped).
    pub channel: String,
    /// Kick reason.
    pub reason: String,
}

/// `channel_burst`: a channel is about to be advertised to a peer.
#[derive(Debug)]
pub struct ChannelBurst {
    /// Channel name (casemapped).
    pub channel: String,
    /// Peer being burst to.
    pub to: Sid,
}

/// `can_destroy`: veto point for empty-channel teardown.
#[derive(Debug)]
pub struct CanDestroy {
    /// Channel name (casemapped).
    pub channel: String,
    /// Set by a listener to keep the channel alive.
    pub veto: bool,
}

/// `show_in_names` / `names_character`: one member's NAMES entry.
#[derive(Debug)]
pub struct NamesEntry {
    /// The member.
    pub uid: Uid,
    /// Channel name (casemapped).
    pub channel: String,
    /// Prefix characters to show, highest level first. `names_character`
    /// listeners may rewrite this.
    pub prefixes: String,
    /// Cleared by a `show_in_names` listener to hide the member.
    pub visible: bool,
}

/// `server.send_burst` / `server.send_ts6_burst`: burst to a peer begins.
#[derive(Debug)]
pub struct SendBurst {
    /// Peer being burst to.
    pub to: Sid,
}

/// The engine's named events.
#[derive(Debug, Default)]
pub struct HookSet {
    /// `user.new`
    pub user_new: Hooks<UserNew>,
    /// `user.can_message`
    pub user_can_message: Hooks<CanMessage>,
    /// `user_joined`
    pub user_joined: Hooks<UserJoined>,
    /// `channel_join`
    pub channel_join: Hooks<UserJoined>,
    /// `channel_part`
    pub channel_part: Hooks<ChannelPart>,
    /// `channel_kick`
    pub channel_kick: Hooks<ChannelKick>,
    /// `channel_burst`
    pub channel_burst: Hooks<ChannelBurst>,
    /// `can_destroy`
    pub can_destroy: Hooks<CanDestroy>,
    /// `show_in_names`
    pub show_in_names: Hooks<NamesEntry>,
    /// `names_character`
    pub names_character: Hooks<NamesEntry>,
    /// `server.send_burst`
    pub send_burst: Hooks<SendBurst>,
    /// `server.send_ts6_burst`
    pub send_ts6_burst: Hooks<SendBurst>,
}
