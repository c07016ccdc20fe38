//! Transactional channel mode application.
//!
//! The applicator takes a flat list of requested changes, runs each one
//! through validation, the permission policy, and any registered mode
//! blocks, then commits the survivors to channel state. It returns the
//! committed subset (the diff callers propagate) plus typed denial
//! records; nothing is emitted on the wire from here.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::Limits;
use crate::id::Uid;
use crate::state::channel::ListEntry;
use crate::state::modes::{ModeChange, ModeKind, ModeTable};
use crate::state::pool::Pool;
use crate::state::Actor;
use crate::util::{irc_lower, truncate_chars};

/// One mode change request batch.
#[derive(Debug, Clone, Copy)]
pub struct ModeRequest {
    /// Who is changing modes.
    pub source: Actor,
    /// Bypass the permission policy (remote and burst traffic).
    pub force: bool,
    /// Status parameters are TS6 UIDs rather than nicknames.
    pub protocol: bool,
}

/// A change that was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denied {
    /// The source lacks status; render as `ERR_CHANOPRIVSNEEDED` unless a
    /// custom reply is carried.
    NoPrivs {
        /// Mode name that was refused.
        mode: String,
        /// Replacement reply text from the mode block, if any.
        custom: Option<String>,
    },
    /// A status change named a target we cannot resolve; render as
    /// `ERR_NOSUCHNICK`.
    NoSuchTarget {
        /// Mode name that was refused.
        mode: String,
        /// The unresolvable identifier.
        target: String,
    },
}

/// Outcome of one applicator run.
#[derive(Debug, Default)]
pub struct Applied {
    /// Committed changes, in commit order, with canonical parameters.
    pub changes: Vec<ModeChange>,
    /// Refused changes, for the numerics layer.
    pub denied: Vec<Denied>,
}

/// Mutable record handed to mode blocks.
#[derive(Debug)]
pub struct ModeBlockCtx {
    /// Casemapped channel name.
    pub channel: String,
    /// Who is changing modes.
    pub source: Actor,
    /// `true` for `+`.
    pub state: bool,
    /// Parameter; a block may replace it before commit.
    pub param: Option<String>,
    /// Extra parameters a block wants emitted alongside.
    pub params: Vec<String>,
    /// Permission bypass flag from the request.
    pub force: bool,
    /// Wire-identifier flag from the request.
    pub protocol: bool,
    /// Whether the source holds basic status (or better).
    pub has_basic_status: bool,
    /// Set to discard the change without a numeric.
    pub do_not_set: bool,
    /// Custom no-privs reply for sources that do hold basic status.
    pub send_no_privs: Option<String>,
    /// Suppress the no-privs numeric entirely.
    pub hide_no_privs: bool,
}

type ModeBlock = Box<dyn Fn(&mut ModeBlockCtx) -> bool>;

/// Registered mode blocks, keyed by mode name, fired in order.
#[derive(Default)]
pub struct ModeHooks {
    blocks: HashMap<String, Vec<ModeBlock>>,
}

impl ModeHooks {
    /// Register a block for a mode name.
    pub fn register<F>(&mut self, name: &str, block: F)
    where
        F: Fn(&mut ModeBlockCtx) -> bool + 'static,
    {
        self.blocks.entry(name.to_string()).or_default().push(Box::new(block));
    }

    /// Fire all blocks for `name`; the first refusal wins.
    fn fire(&self, name: &str, ctx: &mut ModeBlockCtx) -> bool {
        if let Some(blocks) = self.blocks.get(name) {
            for b in blocks {
                if !b(ctx) {
                    return false;
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for ModeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ModeHooks({} modes)", self.blocks.len())
    }
}

/// Apply a batch of mode changes to a channel.
#[allow(clippy::too_many_arguments)]
pub fn apply_cmodes(
    pool: &mut Pool,
    table: &ModeTable,
    blocks: &ModeHooks,
    limits: &Limits,
    channel_name: &str,
    req: ModeRequest,
    changes: &[ModeChange],
    now: i64,
) -> Applied {
    let key = irc_lower(channel_name);
    let mut out = Applied::default();
    if pool.channel(&key).is_none() {
        return out;
    }

    let is_server = matches!(req.source, Actor::Server(_));
    let source_level = match req.source {
        Actor::User(uid) => pool
            .channel(&key)
            .and_then(|c| c.highest_level(uid, table)),
        Actor::Server(_) => None,
    };
    let has_basic = req.force
        || is_server
        || source_level.is_some_and(|l| l >= limits.basic_status_level);
    let set_by = match req.source {
        Actor::User(uid) => pool
            .user(uid)
            .map(|u| u.nick.clone())
            .unwrap_or_else(|| uid.to_ts6()),
        Actor::Server(sid) => pool
            .server(sid)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| sid.to_ts6()),
    };

    for change in changes {
        let Some(kind) = table.kind_of(&change.name) else {
            warn!(mode = %change.name, "skipping unknown mode");
            continue;
        };
        let state = change.state;

        // Parameter presence and shape.
        let mut param = change.param.clone();
        if table.takes_param(kind, state) && param.is_none() {
            match kind {
                ModeKind::List => continue, // list view, not a mutation
                ModeKind::Key if !state => {}
                _ => continue,
            }
        }
        if let Some(p) = &param {
            if p.is_empty() || p.starts_with(':') || p.contains(char::is_whitespace) {
                debug!(mode = %change.name, "skipping malformed parameter");
                continue;
            }
        }
        let max = if kind == ModeKind::List {
            limits.max_ban_length
        } else {
            limits.max_param_length
        };
        param = param.map(|p| truncate_chars(&p, max).to_string());

        // Permission policy for unforced local changes.
        if !req.force && !has_basic {
            out.denied.push(Denied::NoPrivs {
                mode: change.name.clone(),
                custom: None,
            });
            continue;
        }

        // Status targets resolve to a UID before anything commits.
        let mut status_target = None;
        if kind == ModeKind::Status {
            let ident = param.clone().unwrap_or_default();
            let target = if req.protocol {
                Uid::from_ts6(&ident).filter(|u| pool.user(*u).is_some())
            } else {
                pool.user_by_nick(&ident).map(|u| u.uid)
            };
            let Some(target) = target else {
                out.denied.push(Denied::NoSuchTarget {
                    mode: change.name.clone(),
                    target: ident,
                });
                continue;
            };
            let Some(channel) = pool.channel(&key) else {
                break;
            };
            if !channel.has(target) {
                debug!(mode = %change.name, target = %target, "status target not on channel");
                continue;
            }
            if !req.force && !state {
                if let Actor::User(src) = req.source {
                    if src != target {
                        let target_level = channel.highest_level(target, table);
                        if source_level <= target_level {
                            out.denied.push(Denied::NoPrivs {
                                mode: change.name.clone(),
                                custom: None,
                            });
                            continue;
                        }
                    }
                }
            }
            status_target = Some(target);
            param = Some(target.to_ts6());
        }

        // Registered mode blocks get the record last.
        let mut ctx = ModeBlockCtx {
            channel: key.clone(),
            source: req.source,
            state,
            param,
            params: Vec::new(),
            force: req.force,
            protocol: req.protocol,
            has_basic_status: has_basic,
            do_not_set: false,
            send_no_privs: None,
            hide_no_privs: false,
        };
        let won = blocks.fire(&change.name, &mut ctx);
        if !won {
            if ctx.hide_no_privs {
                continue;
            }
            if has_basic {
                if let Some(custom) = ctx.send_no_privs {
                    out.denied.push(Denied::NoPrivs {
                        mode: change.name.clone(),
                        custom: Some(custom),
                    });
                }
            } else {
                out.denied.push(Denied::NoPrivs {
                    mode: change.name.clone(),
                    custom: None,
                });
            }
            continue;
        }
        if ctx.do_not_set {
            continue;
        }
        let param = ctx.param;

        // Commit.
        let Some(channel) = pool.channel_mut(&key) else {
            break;
        };
        let committed = match kind {
            ModeKind::Normal => {
                if state {
                    channel.set_mode(&change.name, None, now);
                } else {
                    channel.unset_mode(&change.name);
                }
                true
            }
            ModeKind::Parameter | ModeKind::ParameterSet => {
                if state {
                    channel.set_mode(&change.name, param.as_deref(), now);
                } else {
                    channel.unset_mode(&change.name);
                }
                true
            }
            ModeKind::Key => {
                if state {
                    channel.set_mode(&change.name, param.as_deref(), now);
                } else {
                    channel.unset_mode(&change.name);
                }
                true
            }
            ModeKind::List => {
                let mask = param.clone().unwrap_or_default();
                if state {
                    channel.add_to_list(
                        &change.name,
                        ListEntry {
                            mask,
                            set_by: set_by.clone(),
                            set_at: now,
                        },
                    )
                } else {
                    channel.remove_from_list(&change.name, &mask)
                }
            }
            ModeKind::Status => {
                let Some(target) = status_target else {
                    continue;
                };
                if state {
                    channel.grant_status(&change.name, target)
                } else {
                    channel.revoke_status(&change.name, target)
                }
            }
        };
        if committed {
            out.changes.push(ModeChange {
                name: change.name.clone(),
                state,
                param,
            });
        }
    }

    out
}
