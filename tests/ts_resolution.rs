//! SJOIN timestamp conflict resolution, end to end.

mod common;

use common::{intro_user, local_user, mesh_with_peer};
use slirc_ts6::{Sid, Uid};

const PEER: Sid = Sid(0);

#[test]
fn their_ts_wins_wipes_modes_and_status() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    let u1 = local_user(&mut m, "u1", 1000);
    m.pool.get_or_create_channel("#x", 1000);
    m.pool.join(u1, "#x");
    {
        let chan = m.pool.channel_mut("#x").unwrap();
        chan.set_mode("no_ext", None, 1000);
        chan.set_mode("protect_topic", None, 1000);
        chan.grant_status("op", u1);
    }
    let remote = intro_user(&mut m, "000", "rem", "001AAAAAB", 900);

    assert!(m.handle_frame(PEER, ":000 SJOIN 900 #x +m :@001AAAAAB", 2000));

    let chan = m.pool.channel("#x").unwrap();
    assert_eq!(chan.time, 900);
    assert!(chan.is_set("moderated"));
    assert!(!chan.is_set("no_ext"));
    assert!(!chan.is_set("protect_topic"));
    assert!(!chan.status_holders("op").contains(&u1));
    assert!(chan.status_holders("op").contains(&remote));
    assert!(chan.has(u1), "losing the TS fight does not remove members");
}

#[test]
fn ts_tie_unions_modes_and_keeps_status() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    let u1 = local_user(&mut m, "u1", 500);
    m.pool.get_or_create_channel("#y", 500);
    m.pool.join(u1, "#y");
    {
        let chan = m.pool.channel_mut("#y").unwrap();
        chan.set_mode("no_ext", None, 500);
        chan.grant_status("op", u1);
    }
    let remote = intro_user(&mut m, "000", "rem", "001AAAAAB", 500);

    assert!(m.handle_frame(PEER, ":000 SJOIN 500 #y +t :+001AAAAAB", 2000));

    let chan = m.pool.channel("#y").unwrap();
    assert_eq!(chan.time, 500);
    assert!(chan.is_set("no_ext"));
    assert!(chan.is_set("protect_topic"));
    assert!(chan.status_holders("op").contains(&u1));
    assert!(chan.status_holders("voice").contains(&remote));
    assert!(chan.has(remote));
}

#[test]
fn ours_wins_joins_users_without_modes() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    m.pool.get_or_create_channel("#z", 100);
    m.pool
        .channel_mut("#z")
        .unwrap()
        .set_mode("invite_only", None, 100);
    let remote = intro_user(&mut m, "000", "rem", "001AAAAAB", 100);

    assert!(m.handle_frame(PEER, ":000 SJOIN 200 #z +m :@001AAAAAB", 2000));

    let chan = m.pool.channel("#z").unwrap();
    assert_eq!(chan.time, 100);
    assert!(chan.is_set("invite_only"));
    assert!(!chan.is_set("moderated"));
    assert!(chan.has(remote));
    assert!(
        chan.status_holders("op").is_empty(),
        "prefixes from a newer advertisement are discarded"
    );
}

/// The channel converges on the older state no matter which SJOIN
/// arrives first.
#[test]
fn tie_break_is_order_independent() {
    let older = ":000 SJOIN 900 #conv +m :@001AAAAAB";
    let newer = ":000 SJOIN 1100 #conv +i :@001AAAAAC";

    let run = |first: &str, second: &str| {
        let mut m = mesh_with_peer("002", "000", &["EUID"]);
        let x = intro_user(&mut m, "000", "xu", "001AAAAAB", 900);
        let y = intro_user(&mut m, "000", "yu", "001AAAAAC", 900);
        assert!(m.handle_frame(PEER, first, 2000));
        assert!(m.handle_frame(PEER, second, 2001));
        let chan = m.pool.channel("#conv").unwrap();
        (
            chan.time,
            chan.is_set("moderated"),
            chan.is_set("invite_only"),
            chan.status_holders("op").contains(&x),
            chan.status_holders("op").contains(&y),
            chan.has(x) && chan.has(y),
        )
    };

    let forward = run(older, newer);
    let reverse = run(newer, older);
    assert_eq!(forward, reverse);
    // And both equal the ts=900 state.
    assert_eq!(forward, (900, true, false, true, false, true));
}

/// Membership stays bidirectional and status lists stay inside the
/// member set across a netjoin storm.
#[test]
fn membership_invariants_after_merges() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    let a = intro_user(&mut m, "000", "a", "001AAAAAB", 100);
    let b = intro_user(&mut m, "000", "b", "001AAAAAC", 100);
    assert!(m.handle_frame(PEER, ":000 SJOIN 600 #inv +nt :@001AAAAAB +001AAAAAC", 2000));
    assert!(m.handle_frame(PEER, ":000 SJOIN 400 #inv +m :~001AAAAAC", 2001));
    assert!(m.handle_frame(PEER, ":001AAAAAB QUIT :gone", 2002));

    let chan = m.pool.channel("#inv").unwrap();
    for &uid in chan.members() {
        let user = m.pool.user(uid).expect("member resolves");
        assert!(user.on_channel("#inv"), "user edge missing for {}", uid);
    }
    for status in ["owner", "admin", "op", "halfop", "voice"] {
        for holder in chan.status_holders(status) {
            assert!(chan.has(*holder), "status holder outside member list");
        }
    }
    let _ = (a, b);
}

/// Users the peer does not physically host are not joinable through it.
#[test]
fn foreign_users_in_nicklist_are_ignored() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    let ours = local_user(&mut m, "ours", 100);
    let token = ours.to_ts6();
    let line = format!(":000 SJOIN 100 #spoof +n :@{}", token);
    assert!(m.handle_frame(PEER, &line, 2000));
    assert!(!m.pool.channel("#spoof").unwrap().has(ours));
}

#[test]
fn quit_breaks_membership_edges() {
    let mut m = mesh_with_peer("002", "000", &["EUID"]);
    let remote = intro_user(&mut m, "000", "rem", "001AAAAAB", 100);
    assert!(m.handle_frame(PEER, ":000 SJOIN 100 #q +n :@001AAAAAB", 2000));
    assert!(m.handle_frame(PEER, ":001AAAAAB QUIT :bye", 2001));
    assert!(m.pool.user(remote).is_none());
    assert!(!m.pool.channel("#q").unwrap().has(remote));
}

#[test]
fn duplicate_uid_disconnects_link() {
    let mut m = mesh_with_peer("001", "000", &["EUID"]);
    intro_user(&mut m, "000", "first", "000AAAAAB", 100);
    let ok = m.handle_frame(
        PEER,
        ":000 EUID second 1 101 +i u c 0 000AAAAAB h * :Second",
        101,
    );
    assert!(!ok);
    assert!(m.pool.server(PEER).is_none(), "offending link torn down");
    assert!(
        m.pool.user(Uid::from_ts6("000AAAAAB").unwrap()).is_none(),
        "peer state removed with the link"
    );
    assert!(m.notices.iter().any(|n| n.contains("UID collision")));
}
