//! Burst generation: advertising our state to a freshly-linked peer.
//!
//! Order matters: users first (channels reference them), then channels
//! with their topics, then bans, then end-of-burst. The first ban burst
//! for a peer may introduce a synthetic "ban agent" user when a ban
//! needs a user source and none of its original actors are still
//! around; the agent quits as soon as the bans are flushed and never
//! enters the pool.

use crate::bans::{Ban, BanType};
use crate::event::{ChannelBurst, SendBurst};
use crate::id::Sid;
use crate::line::Frame;
use crate::mesh::Mesh;
use crate::state::server::caps;
use crate::state::Actor;
use crate::ts6::bans::ban_frames_for_peer;
use crate::ts6::euid::encode_euid;
use crate::ts6::sjoin::{encode_sjoin, encode_tb};

/// Send a full state burst to `to`.
pub fn send_burst(mesh: &mut Mesh, to: Sid, now: i64) {
    mesh.hooks.send_burst.fire(&mut SendBurst { to });
    mesh.hooks.send_ts6_burst.fire(&mut SendBurst { to });

    // Users, except those the peer already owns.
    let user_frames: Vec<String> = mesh
        .pool
        .users()
        .filter(|u| u.location != to)
        .map(|u| encode_euid(u).to_string())
        .collect();
    for f in user_frames {
        mesh.pool.send_to(to, &f);
    }

    // Channels and topics.
    let mut names = Vec::new();
    let mut chan_frames = Vec::new();
    for channel in mesh.pool.channels() {
        names.push(channel.name.clone());
        chan_frames.push(encode_sjoin(channel, &mesh.modes, mesh.me).to_string());
        if let Some(tb) = encode_tb(channel, mesh.me) {
            chan_frames.push(tb.to_string());
        }
    }
    for name in names {
        mesh.hooks.channel_burst.fire(&mut ChannelBurst {
            channel: name,
            to,
        });
    }
    for f in chan_frames {
        mesh.pool.send_to(to, &f);
    }

    burst_bans(mesh, to, now);

    let eob = Frame::new(Some(mesh.me.to_ts6()), "EOB", Vec::new());
    mesh.pool.send_to(to, &eob.to_string());
}

/// One-shot ban advertisement for a peer.
///
/// Expired and disabled bans are skipped. Sets the peer's
/// `bans_negotiated` flag so relinks within the same session do not
/// re-burst.
pub fn burst_bans(mesh: &mut Mesh, to: Sid, now: i64) {
    let Some(link) = mesh.pool.server(to).and_then(|s| s.link.as_ref()) else {
        return;
    };
    if link.bans_negotiated {
        return;
    }

    let bans: Vec<Ban> = mesh.bans.active(now).cloned().collect();
    let agent = if needs_ban_agent(mesh, to, &bans) {
        let agent = mesh.uids.next();
        if let Some(link) = mesh.pool.server_mut(to).and_then(|s| s.link.as_mut()) {
            link.ban_agent = Some(agent);
        }
        let intro = Frame::new(
            Some(mesh.me.to_ts6()),
            "EUID",
            vec![
                "BanAgent".into(),
                "1".into(),
                now.to_string(),
                "+io".into(),
                "bans".into(),
                mesh.name.clone(),
                "0".into(),
                agent.to_ts6(),
                "*".into(),
                "*".into(),
                "ban agent".into(),
            ],
        );
        mesh.pool.send_to(to, &intro.to_string());
        Some(agent)
    } else {
        None
    };

    for ban in &bans {
        match ban_frames_for_peer(mesh, to, ban, now) {
            Ok(frames) => {
                for f in frames {
                    mesh.pool.send_to(to, &f.to_string());
                }
            }
            Err(e) => mesh.server_notice(to, &e),
        }
    }

    if let Some(agent) = agent {
        let quit = Frame::new(
            Some(agent.to_ts6()),
            "QUIT",
            vec!["Ban agent going away".into()],
        );
        mesh.pool.send_to(to, &quit.to_string());
        if let Some(link) = mesh.pool.server_mut(to).and_then(|s| s.link.as_mut()) {
            link.ban_agent = None;
        }
    }
    if let Some(link) = mesh.pool.server_mut(to).and_then(|s| s.link.as_mut()) {
        link.bans_negotiated = true;
    }
}

/// Whether any ban in the burst requires a synthetic user source.
fn needs_ban_agent(mesh: &Mesh, to: Sid, bans: &[Ban]) -> bool {
    let Some(server) = mesh.pool.server(to) else {
        return false;
    };
    if server.has_cap(caps::BAN) {
        // BAN accepts a server source; we can always speak for ourselves.
        return false;
    }
    bans.iter().any(|b| {
        b.kind != BanType::NickDelay
            && !matches!(
                b.recent_source,
                Some(Actor::User(uid)) if mesh.pool.user(uid).is_some()
            )
    })
}
