//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;

use slirc_ts6::{Config, Mesh, Sid, Uid, User};

/// Build an engine for `me_sid` with one linked peer.
pub fn mesh_with_peer(me_sid: &str, peer_sid: &str, peer_caps: &[&str]) -> Mesh {
    // RUST_LOG=debug surfaces engine traces while debugging a test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let config = Config::from_toml_str(&format!(
        "[server]\nname = \"hub.straylight.net\"\nsid = \"{}\"\n",
        me_sid
    ))
    .unwrap();
    let mut mesh = Mesh::new(&config).unwrap();
    mesh.link_peer(
        Sid::from_ts6(peer_sid).unwrap(),
        "peer.straylight.net",
        peer_caps,
    );
    mesh
}

/// Introduce a user as learned through `via`.
pub fn intro_user(mesh: &mut Mesh, via: &str, nick: &str, uid: &str, now: i64) -> Uid {
    let from = Sid::from_ts6(via).unwrap();
    let line = format!(
        ":{} EUID {} 1 {} +i u cloak.net 10.0.0.1 {} host.net * :{}",
        via, nick, now, uid, nick
    );
    assert!(mesh.handle_frame(from, &line, now), "EUID rejected: {}", line);
    Uid::from_ts6(uid).unwrap()
}

/// Register a user of our own server directly, as local registration
/// (out of the engine's scope) would.
pub fn local_user(mesh: &mut Mesh, nick: &str, now: i64) -> Uid {
    let uid = mesh.uids.next();
    mesh.pool
        .add_user(User {
            uid,
            nick: nick.to_string(),
            ident: "u".into(),
            host: "local.host.net".into(),
            cloak: "local.host.net".into(),
            ip: Some("127.0.0.1".into()),
            real: nick.to_string(),
            account: None,
            modes: HashSet::new(),
            nick_time: now,
            server: mesh.me,
            location: mesh.me,
            channels: Vec::new(),
        })
        .unwrap();
    uid
}

/// Every frame queued for `peer`, draining the queue.
pub fn drain(mesh: &mut Mesh, peer: &str) -> Vec<String> {
    mesh.take_sendq(Sid::from_ts6(peer).unwrap())
}
