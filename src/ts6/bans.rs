//! Ban propagation over TS6.
//!
//! Inbound K-line, D-line, resv, and nick-delay traffic lands in the ban
//! store; outbound traffic is re-encoded per peer according to its
//! capability flags:
//!
//! - `BAN` carries absolute timestamps plus a lifetime and takes a user
//!   or server source; it is preferred whenever the peer advertises it.
//! - `KLN`/`UNKLN` allow direct `KLINE`/`UNKLINE` with a relative
//!   duration and require a user source.
//! - Everything else falls back to `ENCAP *` wrapping with relative
//!   durations, also from a user source (except `NICKDELAY`, which must
//!   come from a server).
//!
//! Relative durations that come out non-positive are dropped rather than
//! advertising an already-expired ban.

use tracing::debug;

use crate::bans::{Ban, BanType};
use crate::error::{HandlerResult, ProtoError};
use crate::id::{Sid, Uid};
use crate::line::Frame;
use crate::mesh::Mesh;
use crate::state::Actor;

/// Resolve a frame's source token to an actor, defaulting to the peer.
pub fn actor_from_source(frame: &Frame, from: Sid) -> Actor {
    match frame.source.as_deref() {
        Some(token) if token.len() == 9 => Uid::from_ts6(token)
            .map(Actor::User)
            .unwrap_or(Actor::Server(from)),
        Some(token) => Sid::from_ts6(token)
            .map(Actor::Server)
            .unwrap_or(Actor::Server(from)),
        None => Actor::Server(from),
    }
}

fn actor_sid(actor: Actor) -> Sid {
    match actor {
        Actor::User(uid) => uid.sid,
        Actor::Server(sid) => sid,
    }
}

/// Fill in attribution fields from what the pool knows about the actor.
fn attribute(mesh: &Mesh, ban: &mut Ban, actor: Actor) {
    ban.recent_source = Some(actor);
    ban.aserver = mesh
        .pool
        .server(actor_sid(actor))
        .map(|s| s.name.clone())
        .unwrap_or_else(|| actor_sid(actor).to_ts6());
    if let Actor::User(uid) = actor {
        if let Some(user) = mesh.pool.user(uid) {
            ban.auser = format!("{}!{}@{}", user.nick, user.ident, user.cloak);
        }
    }
}

fn commit_and_propagate(mesh: &mut Mesh, ban: Ban, from: Sid, now: i64) {
    let stored = mesh.bans.upsert(ban).clone();
    propagate_ban(mesh, &stored, Some(from), now);
}

/// Entry point for locally-originated bans (oper commands): store the
/// record and fan it out to every linked peer.
pub fn add_local_ban(mesh: &mut Mesh, ban: Ban, now: i64) {
    let stored = mesh.bans.upsert(ban).clone();
    propagate_ban(mesh, &stored, None, now);
}

/// Re-encode a ban for every linked peer except `except`.
pub fn propagate_ban(mesh: &mut Mesh, ban: &Ban, except: Option<Sid>, now: i64) {
    for sid in mesh.pool.linked_sids() {
        if Some(sid) == except {
            continue;
        }
        match ban_frames_for_peer(mesh, sid, ban, now) {
            Ok(frames) => {
                for f in frames {
                    mesh.pool.send_to(sid, &f.to_string());
                }
            }
            Err(e) => mesh.server_notice(sid, &e),
        }
    }
}

/// Encode one ban for one peer per its capabilities.
///
/// Returns no frames when the ban would go out already expired, and
/// `NoSource` when a required user source cannot be produced.
pub fn ban_frames_for_peer(
    mesh: &Mesh,
    peer: Sid,
    ban: &Ban,
    now: i64,
) -> Result<Vec<Frame>, ProtoError> {
    use crate::state::server::caps;

    let Some(server) = mesh.pool.server(peer) else {
        return Ok(Vec::new());
    };
    let deletion = ban.duration == 0 || ban.disabled;

    // A user source: the actor that last touched the ban if it is still
    // around, else the per-link ban agent during burst.
    let user_src = match ban.recent_source {
        Some(Actor::User(uid)) if mesh.pool.user(uid).is_some() => Some(uid.to_ts6()),
        _ => server
            .link
            .as_ref()
            .and_then(|l| l.ban_agent)
            .map(|u| u.to_ts6()),
    };
    // A source of any kind, for commands that also accept servers.
    let any_src = match ban.recent_source {
        Some(Actor::User(uid)) if mesh.pool.user(uid).is_some() => uid.to_ts6(),
        Some(Actor::Server(sid)) => sid.to_ts6(),
        _ => mesh.me.to_ts6(),
    };
    let relative = ban.expires() - now;

    let frame = match ban.kind {
        BanType::NickDelay => {
            // Server-sourced by requirement; duration zero removes.
            let dur = if deletion {
                0
            } else if relative <= 0 {
                return Ok(Vec::new());
            } else {
                relative
            };
            let src = match ban.recent_source {
                Some(Actor::Server(sid)) => sid.to_ts6(),
                _ => mesh.me.to_ts6(),
            };
            Frame::new(
                Some(src),
                "ENCAP",
                vec![
                    "*".into(),
                    "NICKDELAY".into(),
                    dur.to_string(),
                    ban.mask.clone(),
                ],
            )
        }
        BanType::Dline => {
            let src = user_src.ok_or_else(|| ProtoError::NoSource("dline".into()))?;
            if deletion {
                Frame::new(
                    Some(src),
                    "ENCAP",
                    vec!["*".into(), "UNDLINE".into(), ban.mask.clone()],
                )
            } else {
                if relative <= 0 {
                    return Ok(Vec::new());
                }
                Frame::new(
                    Some(src),
                    "ENCAP",
                    vec![
                        "*".into(),
                        "DLINE".into(),
                        relative.to_string(),
                        ban.mask.clone(),
                        ban.reason.clone(),
                    ],
                )
            }
        }
        BanType::Kline => {
            let user = ban.match_user.clone().unwrap_or_else(|| "*".into());
            let host = ban.match_host.clone().unwrap_or_else(|| ban.mask.clone());
            if server.has_cap(caps::BAN) {
                Frame::new(
                    Some(any_src),
                    "BAN",
                    vec![
                        "K".into(),
                        user,
                        host,
                        ban.modified.to_string(),
                        ban.duration.to_string(),
                        ban.lifetime.to_string(),
                        ban.auser.clone(),
                        ban.reason.clone(),
                    ],
                )
            } else if deletion {
                let src = user_src.ok_or_else(|| ProtoError::NoSource("unkline".into()))?;
                if server.has_cap(caps::UNKLN) {
                    Frame::new(Some(src), "UNKLINE", vec!["*".into(), user, host])
                } else {
                    Frame::new(
                        Some(src),
                        "ENCAP",
                        vec!["*".into(), "UNKLINE".into(), user, host],
                    )
                }
            } else {
                if relative <= 0 {
                    return Ok(Vec::new());
                }
                let src = user_src.ok_or_else(|| ProtoError::NoSource("kline".into()))?;
                if server.has_cap(caps::KLN) {
                    Frame::new(
                        Some(src),
                        "KLINE",
                        vec![
                            "*".into(),
                            relative.to_string(),
                            user,
                            host,
                            ban.reason.clone(),
                        ],
                    )
                } else {
                    Frame::new(
                        Some(src),
                        "ENCAP",
                        vec![
                            "*".into(),
                            "KLINE".into(),
                            relative.to_string(),
                            user,
                            host,
                            ban.reason.clone(),
                        ],
                    )
                }
            }
        }
        BanType::Resv => {
            if server.has_cap(caps::BAN) {
                Frame::new(
                    Some(any_src),
                    "BAN",
                    vec![
                        "R".into(),
                        "*".into(),
                        ban.mask.clone(),
                        ban.modified.to_string(),
                        ban.duration.to_string(),
                        ban.lifetime.to_string(),
                        ban.auser.clone(),
                        ban.reason.clone(),
                    ],
                )
            } else {
                let src = user_src.ok_or_else(|| ProtoError::NoSource("resv".into()))?;
                if deletion {
                    Frame::new(
                        Some(src),
                        "ENCAP",
                        vec!["*".into(), "UNRESV".into(), ban.mask.clone()],
                    )
                } else {
                    if relative <= 0 {
                        return Ok(Vec::new());
                    }
                    Frame::new(
                        Some(src),
                        "ENCAP",
                        vec![
                            "*".into(),
                            "RESV".into(),
                            relative.to_string(),
                            ban.mask.clone(),
                            "0".into(),
                            ban.reason.clone(),
                        ],
                    )
                }
            }
        }
    };
    Ok(vec![frame])
}

// === decoders ===

/// `:uid KLINE <target> <duration> <user> <host> :<reason>`
pub fn handle_kline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    kline_core(mesh, from, frame, 1, now)
}

/// `:uid ENCAP * KLINE <duration> <user> <host> :<reason>`
pub fn encap_kline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    kline_core(mesh, from, frame, 2, now)
}

fn kline_core(mesh: &mut Mesh, from: Sid, frame: &Frame, base: usize, now: i64) -> HandlerResult {
    let duration = parse_duration(frame.req(base)?)?;
    if duration == 0 {
        return Err(ProtoError::BadParameter("kline with zero duration".into()));
    }
    let mask = format!("{}@{}", frame.req(base + 1)?, frame.req(base + 2)?);
    let reason = frame.arg(base + 3).unwrap_or("<no reason>");
    let actor = actor_from_source(frame, from);
    let mut ban = Ban::new(
        BanType::Kline,
        actor_sid(actor),
        &mask,
        reason,
        now,
        duration,
        duration,
    );
    attribute(mesh, &mut ban, actor);
    commit_and_propagate(mesh, ban, from, now);
    Ok(())
}

/// `:uid UNKLINE <target> <user> <host>`
pub fn handle_unkline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    unkline_core(mesh, from, frame, 1, now)
}

/// `:uid ENCAP * UNKLINE <user> <host>`
pub fn encap_unkline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    unkline_core(mesh, from, frame, 2, now)
}

fn unkline_core(mesh: &mut Mesh, from: Sid, frame: &Frame, base: usize, now: i64) -> HandlerResult {
    let mask = format!("{}@{}", frame.req(base)?, frame.req(base + 1)?);
    delete_by_input(mesh, from, frame, BanType::Kline, &mask, now);
    Ok(())
}

/// `:uid ENCAP * DLINE <duration> <ip> :<reason>`
pub fn encap_dline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let duration = parse_duration(frame.req(2)?)?;
    let ip = frame.req(3)?;
    let reason = frame.arg(4).unwrap_or("<no reason>");
    let actor = actor_from_source(frame, from);
    let mut ban = Ban::new(
        BanType::Dline,
        actor_sid(actor),
        ip,
        reason,
        now,
        duration,
        duration,
    );
    attribute(mesh, &mut ban, actor);
    commit_and_propagate(mesh, ban, from, now);
    Ok(())
}

/// `:uid ENCAP * UNDLINE <ip>`
pub fn encap_undline(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let ip = frame.req(2)?.to_string();
    delete_by_input(mesh, from, frame, BanType::Dline, &ip, now);
    Ok(())
}

/// `:uid RESV <target> <duration> <mask> :<reason>`
pub fn handle_resv(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    resv_core(mesh, from, frame, 1, 2, 3, now)
}

/// `:uid ENCAP * RESV <duration> <mask> 0 :<reason>` (the `0` is ignored)
pub fn encap_resv(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    resv_core(mesh, from, frame, 2, 3, 5, now)
}

fn resv_core(
    mesh: &mut Mesh,
    from: Sid,
    frame: &Frame,
    dur_idx: usize,
    mask_idx: usize,
    reason_idx: usize,
    now: i64,
) -> HandlerResult {
    let duration = parse_duration(frame.req(dur_idx)?)?;
    let mask = frame.req(mask_idx)?.to_string();
    let reason = frame.arg(reason_idx).unwrap_or("<no reason>");
    let actor = actor_from_source(frame, from);
    let mut ban = Ban::new(
        BanType::Resv,
        actor_sid(actor),
        &mask,
        reason,
        now,
        duration,
        duration,
    );
    attribute(mesh, &mut ban, actor);
    commit_and_propagate(mesh, ban, from, now);
    Ok(())
}

/// `:uid UNRESV <target> <mask>`
pub fn handle_unresv(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let mask = frame.req(1)?.to_string();
    delete_by_input(mesh, from, frame, BanType::Resv, &mask, now);
    Ok(())
}

/// `:uid ENCAP * UNRESV <mask>`
pub fn encap_unresv(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let mask = frame.req(2)?.to_string();
    delete_by_input(mesh, from, frame, BanType::Resv, &mask, now);
    Ok(())
}

/// `:sid ENCAP * NICKDELAY <duration> <nick>`; duration zero removes.
pub fn encap_nickdelay(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let duration = parse_duration(frame.req(2)?)?;
    let nick = frame.req(3)?.to_string();
    let actor = actor_from_source(frame, from);
    if duration == 0 {
        delete_by_input(mesh, from, frame, BanType::NickDelay, &nick, now);
        return Ok(());
    }
    let mut ban = Ban::new(
        BanType::NickDelay,
        actor_sid(actor),
        &nick,
        "reserved nickname",
        now,
        duration,
        duration,
    );
    attribute(mesh, &mut ban, actor);
    commit_and_propagate(mesh, ban, from, now);
    Ok(())
}

/// `:src BAN <K|R> <user> <host> <creationTS> <duration> <lifetime> <oper> :<reason>`
///
/// Duration zero is the legacy deletion encoding.
pub fn handle_ban(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let type_token = frame.req(0)?;
    let mut letters = type_token.chars();
    let (letter, extra) = (letters.next(), letters.next());
    let kind = match (letter, extra) {
        (Some(l), None) => {
            BanType::from_ban_letter(l).ok_or(ProtoError::UnknownBanType(l))?
        }
        _ => return Err(ProtoError::BadFrame(format!("bad ban type: {}", type_token))),
    };
    let user = frame.req(1)?;
    let host = frame.req(2)?;
    let created = parse_duration(frame.req(3)?)?;
    let duration = parse_duration(frame.req(4)?)?;
    let lifetime = parse_duration(frame.req(5)?)?;
    let oper = frame.req(6)?.to_string();
    let reason = frame.arg(7).unwrap_or("<no reason>");

    let mask = match kind {
        BanType::Kline => format!("{}@{}", user, host),
        _ => host.to_string(),
    };
    let actor = actor_from_source(frame, from);
    let mut ban = Ban::new(
        kind,
        actor_sid(actor),
        &mask,
        reason,
        created,
        duration,
        lifetime,
    );
    ban.modified = created;
    attribute(mesh, &mut ban, actor);
    ban.auser = oper;
    commit_and_propagate(mesh, ban, from, now);
    Ok(())
}

/// Deletion by textual mask: mark the known record deleted, or
/// propagate an ephemeral deletion when we never saw the ban.
fn delete_by_input(
    mesh: &mut Mesh,
    from: Sid,
    frame: &Frame,
    kind: BanType,
    text: &str,
    now: i64,
) {
    let actor = actor_from_source(frame, from);
    match mesh.bans.by_user_input(kind, text) {
        Some(existing) => {
            let mut deletion = existing.clone();
            deletion.duration = 0;
            deletion.modified = now;
            deletion.recent_source = Some(actor);
            commit_and_propagate(mesh, deletion, from, now);
        }
        None => {
            debug!(kind = kind.name(), mask = text, "deletion for unknown ban");
            let mut ghost = Ban::new(kind, actor_sid(actor), text, "", now, 0, 0);
            attribute(mesh, &mut ghost, actor);
            // Not worth retaining; just fan the deletion out.
            propagate_ban(mesh, &ghost, Some(from), now);
        }
    }
}

fn parse_duration(s: &str) -> Result<i64, ProtoError> {
    s.parse::<i64>()
        .ok()
        .filter(|d| *d >= 0)
        .ok_or_else(|| ProtoError::BadParameter(format!("bad duration: {}", s)))
}
