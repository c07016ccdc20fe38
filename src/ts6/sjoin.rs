//! SJOIN: channel burst and netjoin merge, with TS conflict resolution.
//!
//! `:sid SJOIN <ts> <chan> <modes> [args...] :<nicklist>`
//!
//! The advertised timestamp decides whose channel state survives:
//! strictly older wins outright (our simple modes and statuses are
//! wiped), a tie merges both sides, and a newer advertisement only
//! contributes its members, stripped of modes and prefixes.
//!
//! Also home to TB, the topic half of a channel burst.

use tracing::debug;

use crate::error::{HandlerResult, ProtoError};
use crate::event::UserJoined;
use crate::id::{Sid, Uid};
use crate::line::Frame;
use crate::mesh::Mesh;
use crate::state::apply::{apply_cmodes, ModeRequest};
use crate::state::channel::Channel;
use crate::state::modes::{ModeChange, ModeTable};
use crate::state::Actor;

/// Decode and merge one SJOIN.
pub fn handle_sjoin(mesh: &mut Mesh, from: Sid, frame: &Frame, now: i64) -> HandlerResult {
    let adv = source_sid(frame, from)?;
    let ts = frame
        .req(0)?
        .parse::<i64>()
        .map_err(|_| ProtoError::BadParameter(format!("bad ts: {}", frame.args[0])))?;
    let chan_name = frame.req(1)?;
    let modestr = frame.req(2)?.to_string();
    if frame.args.len() < 4 {
        return Err(ProtoError::NeedMoreParams);
    }
    let nicklist = frame.args[frame.args.len() - 1].clone();
    let mode_params: Vec<&str> = frame.args[3..frame.args.len() - 1]
        .iter()
        .map(String::as_str)
        .collect();

    let (key, _created) = mesh.pool.get_or_create_channel(chan_name, ts);

    // Snapshot what we hold before the timestamps move.
    let (old_time, old_simple, old_status) = {
        let Some(channel) = mesh.pool.channel(&key) else {
            return Ok(());
        };
        (
            channel.time,
            channel.simple_mode_changes(&mesh.modes),
            channel.status_changes(&mesh.modes),
        )
    };

    let new_time = ts.min(old_time);
    if let Some(channel) = mesh.pool.channel_mut(&key) {
        channel.take_lower_time(new_time, true);
    }

    let their_ts_wins = ts < old_time;
    let accept = ts <= old_time;

    let mut to_apply: Vec<ModeChange> = Vec::new();
    if their_ts_wins {
        // Their state replaces ours: revoke everything we held, the
        // advertisement re-adds whatever survives.
        to_apply.extend(old_simple.iter().map(ModeChange::inverse));
        to_apply.extend(old_status.iter().map(ModeChange::inverse));
    }
    if accept {
        to_apply.extend(
            mesh.perspective(adv)
                .cmodes_from_string(&modestr, &mode_params),
        );
    }

    for token in nicklist.split_whitespace() {
        let (prefixes, uid_token) = split_nick_token(mesh.perspective(adv), token);
        let Some(uid) = Uid::from_ts6(uid_token) else {
            debug!(token, "skipping unparsable nicklist token");
            continue;
        };
        let Some(user) = mesh.pool.user(uid) else {
            debug!(uid = %uid, "skipping unknown user in nicklist");
            continue;
        };
        if user.location != from {
            debug!(uid = %uid, "skipping user not located at advertising peer");
            continue;
        }
        if mesh.pool.join(uid, &key) {
            let mut payload = UserJoined {
                uid,
                channel: key.clone(),
            };
            mesh.hooks.user_joined.fire(&mut payload);
            mesh.hooks.channel_join.fire(&mut payload);
        }
        if accept {
            for status in &prefixes {
                to_apply.push(ModeChange::new(status, true, Some(uid_token)));
            }
        }
    }

    apply_cmodes(
        &mut mesh.pool,
        &mesh.modes,
        &mesh.mode_hooks,
        &mesh.limits,
        &key,
        ModeRequest {
            source: Actor::Server(adv),
            force: true,
            protocol: true,
        },
        &to_apply,
        now,
    );
    Ok(())
}

/// Decode a topic burst.
///
/// `:sid TB <chan> <topicTS> [<setby>] :<text>`
///
/// Accepted when we have no topic, or theirs is older than ours (an
/// older TS with the same text merely backdates the record).
pub fn handle_tb(mesh: &mut Mesh, from: Sid, frame: &Frame, _now: i64) -> HandlerResult {
    let adv = source_sid(frame, from)?;
    let chan_name = frame.req(0)?;
    let ts = frame
        .req(1)?
        .parse::<i64>()
        .map_err(|_| ProtoError::BadParameter(format!("bad topic ts: {}", frame.args[1])))?;
    let (set_by, text) = match frame.args.len() {
        0..=2 => return Err(ProtoError::NeedMoreParams),
        3 => (adv.to_ts6(), frame.args[2].clone()),
        _ => (frame.args[2].clone(), frame.args[3].clone()),
    };

    let source = adv.to_ts6();
    let Some(channel) = mesh.pool.channel_mut(chan_name) else {
        return Ok(()); // topic for a channel we do not hold
    };
    let accept = match &channel.topic {
        None => true,
        Some(topic) => ts < topic.set_at,
    };
    if accept {
        channel.do_topic(&text, &set_by, ts, &source);
    }
    Ok(())
}

/// Encode a channel's full state for burst.
pub fn encode_sjoin(channel: &Channel, table: &ModeTable, me: Sid) -> Frame {
    let simple = channel.simple_mode_changes(table);
    let serialized = table.strings_from_cmodes(&simple, None, true);
    let (modestr, params) = serialized
        .into_iter()
        .next()
        .unwrap_or_else(|| ("+".to_string(), Vec::new()));

    let mut nicklist = String::new();
    for &uid in channel.members() {
        if !nicklist.is_empty() {
            nicklist.push(' ');
        }
        for status in channel.statuses_of(uid, table) {
            if let Some(info) = table.status_info(status) {
                nicklist.push(info.prefix);
            }
        }
        nicklist.push_str(&uid.to_ts6());
    }

    let mut args = vec![channel.time.to_string(), channel.name.clone(), modestr];
    args.extend(params);
    args.push(nicklist);
    Frame::new(Some(me.to_ts6()), "SJOIN", args)
}

/// Encode a channel's topic for burst, if it has one.
pub fn encode_tb(channel: &Channel, me: Sid) -> Option<Frame> {
    let topic = channel.topic.as_ref()?;
    Some(Frame::new(
        Some(me.to_ts6()),
        "TB",
        vec![
            channel.name.clone(),
            topic.set_at.to_string(),
            topic.set_by.clone(),
            topic.text.clone(),
        ],
    ))
}

fn source_sid(frame: &Frame, from: Sid) -> Result<Sid, ProtoError> {
    match &frame.source {
        Some(token) => Sid::from_ts6(token)
            .ok_or_else(|| ProtoError::BadParameter(format!("bad source sid: {}", token))),
        None => Ok(from),
    }
}

fn split_nick_token<'t>(table: &ModeTable, token: &'t str) -> (Vec<String>, &'t str) {
    let mut statuses = Vec::new();
    let mut rest = token;
    for (i, c) in token.char_indices() {
        match table.status_by_prefix(c) {
            Some(name) => statuses.push(name.to_string()),
            None => {
                rest = &token[i..];
                break;
            }
        }
    }
    (statuses, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::line::Frame;
    use crate::ts6::euid::handle_euid;

    fn mesh() -> Mesh {
        let config = Config::from_toml_str(
            "[server]\nname = \"hub.straylight.net\"\nsid = \"001\"\n",
        )
        .unwrap();
        let mut m = Mesh::new(&config).unwrap();
        m.link_peer(Sid(0), "peer.straylight.net", &[]);
        m
    }

    fn intro(m: &mut Mesh, nick: &str, uid: &str) -> Uid {
        let raw = format!(":000 EUID {} 1 900 +i u c 0 {} h * :r", nick, uid);
        handle_euid(m, Sid(0), &Frame::parse(&raw).unwrap(), 900).unwrap();
        Uid::from_ts6(uid).unwrap()
    }

    fn sjoin(m: &mut Mesh, raw: &str) {
        handle_sjoin(m, Sid(0), &Frame::parse(raw).unwrap(), 2000).unwrap();
    }

    #[test]
    fn test_new_channel_adopts_ts_and_statuses() {
        let mut m = mesh();
        let uid = intro(&mut m, "alice", "000AAAAAB");
        sjoin(&mut m, ":000 SJOIN 1500 #new +nt :@000AAAAAB");
        let chan = m.pool.channel("#new").unwrap();
        assert_eq!(chan.time, 1500);
        assert!(chan.is_set("no_ext"));
        assert!(chan.status_holders("op").contains(&uid));
        assert!(m.pool.user(uid).unwrap().on_channel("#new"));
    }

    #[test]
    fn test_their_ts_wins_wipes_ours() {
        let mut m = mesh();
        // Local channel at ts 1000 with +nt and a local op.
        let local = intro(&mut m, "luser", "001AAAAAA");
        m.pool.get_or_create_channel("#x", 1000);
        m.pool.join(local, "#x");
        {
            let chan = m.pool.channel_mut("#x").unwrap();
            chan.set_mode("no_ext", None, 1000);
            chan.set_mode("protect_topic", None, 1000);
            chan.grant_status("op", local);
        }
        let remote = intro(&mut m, "ruser", "000AAAAAB");
        sjoin(&mut m, ":000 SJOIN 900 #x +m :@000AAAAAB");

        let chan = m.pool.channel("#x").unwrap();
        assert_eq!(chan.time, 900);
        assert!(chan.is_set("moderated"));
        assert!(!chan.is_set("no_ext"));
        assert!(!chan.is_set("protect_topic"));
        assert!(!chan.status_holders("op").contains(&local));
        assert!(chan.status_holders("op").contains(&remote));
        assert!(chan.has(local));
    }

    #[test]
    fn test_tie_unions_both_sides() {
        let mut m = mesh();
        let local = intro(&mut m, "luser", "001AAAAAA");
        m.pool.get_or_create_channel("#y", 500);
        m.pool.join(local, "#y");
        {
            let chan = m.pool.channel_mut("#y").unwrap();
            chan.set_mode("no_ext", None, 500);
            chan.grant_status("op", local);
        }
        let remote = intro(&mut m, "ruser", "000AAAAAB");
        sjoin(&mut m, ":000 SJOIN 500 #y +t :+000AAAAAB");

        let chan = m.pool.channel("#y").unwrap();
        assert_eq!(chan.time, 500);
        assert!(chan.is_set("no_ext"));
        assert!(chan.is_set("protect_topic"));
        assert!(chan.status_holders("op").contains(&local));
        assert!(chan.status_holders("voice").contains(&remote));
    }

    #[test]
    fn test_ours_wins_users_join_bare() {
        let mut m = mesh();
        m.pool.get_or_create_channel("#z", 100);
        m.pool
            .channel_mut("#z")
            .unwrap()
            .set_mode("invite_only", None, 100);
        let remote = intro(&mut m, "ruser", "000AAAAAB");
        sjoin(&mut m, ":000 SJOIN 200 #z +m :@000AAAAAB");

        let chan = m.pool.channel("#z").unwrap();
        assert_eq!(chan.time, 100);
        assert!(chan.is_set("invite_only"));
        assert!(!chan.is_set("moderated"));
        assert!(chan.has(remote));
        assert!(chan.status_holders("op").is_empty());
    }

    #[test]
    fn test_users_not_located_at_peer_skipped() {
        let mut m = mesh();
        // A local user cannot be claimed by a remote SJOIN.
        let local = intro(&mut m, "luser", "001AAAAAA");
        m.pool.user_mut(local).unwrap().location = Sid(1);
        sjoin(&mut m, ":000 SJOIN 100 #w +n :@001AAAAAA");
        assert!(!m.pool.channel("#w").unwrap().has(local));
    }

    #[test]
    fn test_sjoin_key_and_params() {
        let mut m = mesh();
        let remote = intro(&mut m, "ruser", "000AAAAAB");
        sjoin(&mut m, ":000 SJOIN 700 #k +ntk sesame :000AAAAAB");
        let chan = m.pool.channel("#k").unwrap();
        assert_eq!(chan.param_of("key"), Some("sesame"));
        assert!(chan.has(remote));
    }

    #[test]
    fn test_topic_burst_merge() {
        let mut m = mesh();
        m.pool.get_or_create_channel("#t", 100);
        let tb = Frame::parse(":000 TB #t 1200 setter :first").unwrap();
        handle_tb(&mut m, Sid(0), &tb, 2000).unwrap();
        assert_eq!(m.pool.channel("#t").unwrap().topic.as_ref().unwrap().text, "first");

        // Newer TS loses.
        let newer = Frame::parse(":000 TB #t 1300 setter :second").unwrap();
        handle_tb(&mut m, Sid(0), &newer, 2000).unwrap();
        assert_eq!(m.pool.channel("#t").unwrap().topic.as_ref().unwrap().text, "first");

        // Older TS wins.
        let older = Frame::parse(":000 TB #t 1100 setter :oldest").unwrap();
        handle_tb(&mut m, Sid(0), &older, 2000).unwrap();
        let topic = m.pool.channel("#t").unwrap().topic.clone().unwrap();
        assert_eq!(topic.text, "oldest");
        assert_eq!(topic.set_at, 1100);
    }

    #[test]
    fn test_encode_sjoin() {
        let mut m = mesh();
        let a = intro(&mut m, "alice", "000AAAAAB");
        let b = intro(&mut m, "bob", "000AAAAAC");
        sjoin(&mut m, ":000 SJOIN 700 #e +nt :@000AAAAAB +000AAAAAC");
        let chan = m.pool.channel("#e").unwrap();
        let f = encode_sjoin(chan, &m.modes, m.me);
        let line = f.to_string();
        assert!(line.starts_with(":001 SJOIN 700 #e +nt"));
        assert!(line.contains("@000AAAAAB"));
        assert!(line.contains("+000AAAAAC"));
        assert!(chan.has(a) && chan.has(b));
    }
}
