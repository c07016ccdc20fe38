//! The TS6 translation layer.
//!
//! Inbound frames decode into pool/ban mutations; outbound state is
//! re-encoded per peer. Fan-out is this layer's job: anything accepted
//! from one peer is re-propagated to every other linked peer, never back
//! to where it came from. The ban family re-encodes per capability
//! flags; everything else forwards as received.

pub mod bans;
pub mod burst;
pub mod euid;
pub mod sjoin;

use tracing::debug;

use crate::error::{HandlerResult, ProtoError};
use crate::id::{Sid, Uid};
use crate::line::Frame;
use crate::mesh::Mesh;

impl Mesh {
    /// Process one raw inbound line from a directly-linked peer.
    ///
    /// Returns whether the frame was applied. Failures stay local: the
    /// frame is dropped and an operator notice recorded, except a UID
    /// collision, which disconnects the link entirely.
    pub fn handle_frame(&mut self, from: Sid, raw: &str, now: i64) -> bool {
        let frame = match Frame::parse(raw) {
            Ok(f) => f,
            Err(e) => {
                self.server_notice(from, &e);
                return false;
            }
        };
        match dispatch(self, from, &frame, now) {
            Ok(()) => true,
            Err(e) => {
                self.server_notice(from, &e);
                if e.is_fatal() {
                    self.pool.disconnect_server(from, "UID collision");
                }
                false
            }
        }
    }
}

/// Route one decoded frame.
pub fn dispatch(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    match frame.command.to_ascii_uppercase().as_str() {
        "EUID" => {
            euid::handle_euid(mesh, from, frame, now)?;
            forward(mesh, from, frame);
            Ok(())
        }
        "SJOIN" => {
            sjoin::handle_sjoin(mesh, from, frame, now)?;
            forward(mesh, from, frame);
            Ok(())
        }
        "TB" => {
            sjoin::handle_tb(mesh, from, frame, now)?;
            forward(mesh, from, frame);
            Ok(())
        }
        "EOB" => {
            let sid = match frame.source.as_deref() {
                Some(token) => Sid::from_ts6(token).unwrap_or(from),
                None => from,
            };
            if let Some(server) = mesh.pool.server_mut(sid) {
                server.is_burst = false;
            }
            forward(mesh, from, frame);
            Ok(())
        }
        "QUIT" => {
            if let Some(uid) = frame.source.as_deref().and_then(Uid::from_ts6) {
                mesh.pool.remove_user(uid);
            }
            forward(mesh, from, frame);
            Ok(())
        }
        "BAN" => bans::handle_ban(mesh, from, frame, now),
        "KLINE" => bans::handle_kline(mesh, from, frame, now),
        "UNKLINE" => bans::handle_unkline(mesh, from, frame, now),
        "RESV" => bans::handle_resv(mesh, from, frame, now),
        "UNRESV" => bans::handle_unresv(mesh, from, frame, now),
        "ENCAP" => {
            // The target mask is advisory; received bans are global.
            let sub = frame.req(1)?.to_ascii_uppercase();
            match sub.as_str() {
                "KLINE" => bans::encap_kline(mesh, from, frame, now),
                "UNKLINE" => bans::encap_unkline(mesh, from, frame, now),
                "DLINE" => bans::encap_dline(mesh, from, frame, now),
                "UNDLINE" => bans::encap_undline(mesh, from, frame, now),
                "RESV" => bans::encap_resv(mesh, from, frame, now),
                "UNRESV" => bans::encap_unresv(mesh, from, frame, now),
                "NICKDELAY" => bans::encap_nickdelay(mesh, from, frame, now),
                _ => {
                    // Opaque extension; pass it along untouched.
                    debug!(subcommand = %sub, "forwarding unhandled ENCAP");
                    forward(mesh, from, frame);
                    Ok(())
                }
            }
        }
        other => Err(ProtoError::BadFrame(format!("unknown command: {}", other))),
    }
}

/// Re-send a frame verbatim to every other linked peer.
fn forward(mesh: &mut Mesh, from: Sid, frame: &Frame) {
    let mut f = frame.clone();
    if f.source.is_none() {
        f.source = Some(from.to_ts6());
    }
    mesh.pool.broadcast_except(&f.to_string(), Some(from));
}
