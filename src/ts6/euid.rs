//! EUID: user introduction.
//!
//! `:sid EUID nick hopcount nickTS umodes ident cloak ip uid host account :real`
//!
//! `*` in the host slot means the real host equals the cloak, `0` in the
//! ip slot means no usable IP, `*` in the account slot means logged out.

use tracing::debug;

use crate::error::{HandlerResult, ProtoError};
use crate::event::UserNew;
use crate::id::{Sid, Uid};
use crate::line::Frame;
use crate::mesh::Mesh;
use crate::state::user::User;

/// Decode an EUID frame and register the user.
pub fn handle_euid(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let nick = frame.req(0)?;
    let nick_time = frame.req(2)?.parse::<i64>().unwrap_or(now);
    let umodes = frame.req(3)?;
    let ident = frame.req(4)?;
    let cloak = frame.req(5)?;
    let ip = frame.req(6)?;
    let uid_token = frame.req(7)?;
    let host = frame.req(8)?;
    let account = frame.req(9)?;
    let real = frame.arg(10).unwrap_or_default();

    let uid = Uid::from_ts6(uid_token)
        .ok_or_else(|| ProtoError::BadParameter(format!("bad uid: {}", uid_token)))?;
    if mesh.pool.user(uid).is_some() {
        return Err(ProtoError::UidCollision(uid_token.to_string()));
    }

    let user = User {
        uid,
        nick: nick.to_string(),
        ident: ident.to_string(),
        host: if host == "*" { cloak.to_string() } else { host.to_string() },
        cloak: cloak.to_string(),
        ip: (ip != "0").then(|| ip.to_string()),
        real: real.to_string(),
        account: (account != "*" && account != "0").then(|| account.to_string()),
        modes: umodes.chars().filter(|c| *c != '+').collect(),
        nick_time,
        server: uid.sid,
        location: from,
        channels: Vec::new(),
    };
    debug!(uid = %uid, nick = %nick, "introduced user");
    mesh.pool.add_user(user)?;
    mesh.hooks.user_new.fire(&mut UserNew { uid });
    Ok(())
}

/// Encode a user introduction for burst.
pub fn encode_euid(user: &User) -> Frame {
    let mut umodes = String::from("+");
    let mut letters: Vec<char> = user.modes.iter().copied().collect();
    letters.sort_unstable();
    umodes.extend(letters);
    Frame::new(
        Some(user.server.to_ts6()),
        "EUID",
        vec![
            user.nick.clone(),
            "1".to_string(),
            user.nick_time.to_string(),
            umodes,
            user.ident.clone(),
            user.cloak.clone(),
            user.ip.clone().unwrap_or_else(|| "0".to_string()),
            user.uid.to_ts6(),
            if user.host == user.cloak { "*".to_string() } else { user.host.clone() },
            user.account.clone().unwrap_or_else(|| "*".to_string()),
            user.real.clone(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn mesh() -> Mesh {
        let config = Config::from_toml_str(
            "[server]\nname = \"hub.straylight.net\"\nsid = \"001\"\n",
        )
        .unwrap();
        let mut m = Mesh::new(&config).unwrap();
        m.link_peer(Sid(0), "peer.straylight.net", &[]);
        m
    }

    fn intro(mesh: &mut Mesh, raw: &str) -> HandlerResult {
        let frame = Frame::parse(raw).unwrap();
        handle_euid(mesh, Sid(0), &frame, 1000)
    }

    #[test]
    fn test_introduce_user() {
        let mut m = mesh();
        intro(
            &mut m,
            ":000 EUID alice 1 900 +iw al cloak.net 10.0.0.1 000AAAAAB real.host.net * :Alice",
        )
        .unwrap();
        let uid = Uid::from_ts6("000AAAAAB").unwrap();
        let u = m.pool.user(uid).unwrap();
        assert_eq!(u.nick, "alice");
        assert_eq!(u.host, "real.host.net");
        assert_eq!(u.cloak, "cloak.net");
        assert_eq!(u.ip.as_deref(), Some("10.0.0.1"));
        assert!(u.account.is_none());
        assert!(u.modes.contains(&'i'));
        assert_eq!(u.location, Sid(0));
    }

    #[test]
    fn test_placeholders() {
        let mut m = mesh();
        intro(
            &mut m,
            ":000 EUID bob 1 900 + b cloak.net 0 000AAAAAC * acct :Bob",
        )
        .unwrap();
        let u = m.pool.user(Uid::from_ts6("000AAAAAC").unwrap()).unwrap();
        assert_eq!(u.host, "cloak.net");
        assert!(u.ip.is_none());
        assert_eq!(u.account.as_deref(), Some("acct"));
    }

    #[test]
    fn test_duplicate_uid_is_fatal() {
        let mut m = mesh();
        let line = ":000 EUID alice 1 900 +i al c 0 000AAAAAB h * :A";
        intro(&mut m, line).unwrap();
        let err = intro(&mut m, ":000 EUID alice2 1 901 +i al c 0 000AAAAAB h * :A").unwrap_err();
        assert_eq!(err, ProtoError::UidCollision("000AAAAAB".into()));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_encode_round_trip() {
        let mut m = mesh();
        intro(
            &mut m,
            ":000 EUID alice 1 900 +iw al cloak.net 10.0.0.1 000AAAAAB real.host.net * :Alice",
        )
        .unwrap();
        let u = m.pool.user(Uid::from_ts6("000AAAAAB").unwrap()).unwrap();
        let f = encode_euid(u);
        assert_eq!(
            f.to_string(),
            ":000 EUID alice 1 900 +iw al cloak.net 10.0.0.1 000AAAAAB real.host.net * :Alice"
        );
    }
}
