//! Global ban records and their lifecycle.
//!
//! A ban's identity is `"{sid}.{fnv1a(mask)}"`: the internal ID of the
//! server that created it, a dot, and the FNV-1a 32-bit hash of the
//! lowercased mask rendered in decimal. Two bans with the same identity
//! are the same ban no matter how their textual masks were spelled, which
//! is what lets deletions and updates converge across peers that saw
//! different variants. The hash construction is part of the wire
//! contract; legacy peers compute the same value.
//!
//! Bans are never persisted; they live in memory and are re-advertised
//! to every peer at burst time.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::id::Sid;
use crate::state::user::User;
use crate::state::Actor;
use crate::util::{irc_eq, irc_lower, mask_match};

/// What a ban applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanType {
    /// `ident@host` / `ident@ip` ban.
    Kline,
    /// IP ban.
    Dline,
    /// Reserved nick or channel mask.
    Resv,
    /// Temporarily-reserved nickname (services enforcement).
    NickDelay,
}

impl BanType {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            BanType::Kline => "kline",
            BanType::Dline => "dline",
            BanType::Resv => "resv",
            BanType::NickDelay => "nick_delay",
        }
    }

    /// Type letter used by the unified `BAN` command, where one exists.
    pub fn ban_letter(self) -> Option<char> {
        match self {
            BanType::Kline => Some('K'),
            BanType::Resv => Some('R'),
            BanType::Dline | BanType::NickDelay => None,
        }
    }

    /// Reverse of [`BanType::ban_letter`].
    pub fn from_ban_letter(letter: char) -> Option<Self> {
        match letter {
            'K' => Some(BanType::Kline),
            'R' => Some(BanType::Resv),
            _ => None,
        }
    }
}

/// FNV-1a, 32-bit.
pub fn fnv1a_32(input: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in input.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

/// Compute the global identity of a ban created by `sid` for `mask`.
pub fn ban_id(sid: Sid, mask: &str) -> String {
    format!("{}.{}", sid.0, fnv1a_32(&irc_lower(mask)))
}

/// One ban record.
#[derive(Debug, Clone)]
pub struct Ban {
    /// Global identity (`sid.hash`).
    pub id: String,
    /// What the ban applies to.
    pub kind: BanType,
    /// The full mask as set.
    pub mask: String,
    /// Ident half of a K-line mask.
    pub match_user: Option<String>,
    /// Host half of a K-line mask.
    pub match_host: Option<String>,
    /// Ban reason.
    pub reason: String,
    /// When the ban was first created.
    pub added: i64,
    /// Last modification time; the tie-break for conflicting updates.
    pub modified: i64,
    /// Seconds from `modified` until the ban stops matching. Zero means
    /// the ban is deleted (the record is kept to propagate the deletion).
    pub duration: i64,
    /// Seconds from `modified` until the record may be pruned.
    pub lifetime: i64,
    /// Name of the server it was added on.
    pub aserver: String,
    /// Oper mask it was added by, `*` when unknown.
    pub auser: String,
    /// Most recent actor to touch the ban, used as the outbound source.
    pub recent_source: Option<Actor>,
    /// Administratively disabled without deletion.
    pub disabled: bool,
}

impl Ban {
    /// Create a ban; derives the identity and, for K-lines, splits the
    /// mask into its ident/host halves.
    pub fn new(kind: BanType, origin: Sid, mask: &str, reason: &str, now: i64, duration: i64, lifetime: i64) -> Self {
        let (match_user, match_host) = match kind {
            BanType::Kline => match mask.split_once('@') {
                Some((u, h)) => (Some(u.to_string()), Some(h.to_string())),
                None => (Some("*".to_string()), Some(mask.to_string())),
            },
            _ => (None, None),
        };
        Self {
            id: ban_id(origin, mask),
            kind,
            mask: mask.to_string(),
            match_user,
            match_host,
            reason: reason.to_string(),
            added: now,
            modified: now,
            duration,
            lifetime: lifetime.max(duration),
            aserver: String::new(),
            auser: "*".to_string(),
            recent_source: None,
            disabled: false,
        }
    }

    /// When the ban stops matching.
    pub fn expires(&self) -> i64 {
        self.modified + self.duration
    }

    /// When the record may be pruned.
    pub fn lifetime_end(&self) -> i64 {
        self.modified + self.lifetime
    }

    /// Whether the ban currently matches anything.
    pub fn is_active(&self, now: i64) -> bool {
        !self.disabled && self.duration > 0 && now < self.expires()
    }

    /// Whether the record has outlived its lifetime.
    pub fn should_prune(&self, now: i64) -> bool {
        now >= self.lifetime_end()
    }

    /// Evaluate the ban against a user's identity tuple.
    pub fn matches(&self, user: &User) -> bool {
        match self.kind {
            BanType::Kline => {
                mask_match(&self.mask, &user.kline_tuple_host())
                    || user
                        .kline_tuple_ip()
                        .is_some_and(|t| mask_match(&self.mask, &t))
            }
            BanType::Dline => user.ip.as_ref().is_some_and(|ip| mask_match(&self.mask, ip)),
            BanType::Resv | BanType::NickDelay => mask_match(&self.mask, &user.nick),
        }
    }

    /// Evaluate a resv/nick-delay ban against a nick or channel name.
    pub fn matches_name(&self, name: &str) -> bool {
        matches!(self.kind, BanType::Resv | BanType::NickDelay) && mask_match(&self.mask, name)
    }
}

/// In-memory ban table, keyed by global identity.
#[derive(Debug, Default)]
pub struct BanStore {
    bans: HashMap<String, Ban>,
}

impl BanStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by identity.
    ///
    /// An incoming record with a newer `modified` replaces the mutable
    /// fields; an older one only ever extends the lifetime. The creation
    /// time keeps the oldest value either way. A kind mismatch on an
    /// existing identity is logged and the stored kind kept.
    pub fn upsert(&mut self, incoming: Ban) -> &Ban {
        let id = incoming.id.clone();
        match self.bans.entry(id) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                let existing = e.get_mut();
                if existing.kind != incoming.kind {
                    warn!(
                        id = %existing.id,
                        stored = existing.kind.name(),
                        incoming = incoming.kind.name(),
                        "ban type mismatch on update; keeping stored type"
                    );
                }
                existing.lifetime = existing.lifetime.max(incoming.lifetime);
                existing.added = existing.added.min(incoming.added);
                if incoming.modified > existing.modified {
                    existing.mask = incoming.mask;
                    existing.match_user = incoming.match_user;
                    existing.match_host = incoming.match_host;
                    existing.reason = incoming.reason;
                    existing.duration = incoming.duration;
                    existing.modified = incoming.modified;
                    existing.aserver = incoming.aserver;
                    existing.auser = incoming.auser;
                    existing.recent_source = incoming.recent_source;
                    existing.disabled = incoming.disabled;
                }
                e.into_mut()
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                debug!(id = %incoming.id, kind = incoming.kind.name(), "new ban");
                e.insert(incoming)
            }
        }
    }

    /// Look up by identity.
    pub fn get(&self, id: &str) -> Option<&Ban> {
        self.bans.get(id)
    }

    /// All retained records.
    pub fn all(&self) -> impl Iterator<Item = &Ban> {
        self.bans.values()
    }

    /// Records that currently match (not disabled, not expired).
    pub fn active(&self, now: i64) -> impl Iterator<Item = &Ban> {
        self.bans.values().filter(move |b| b.is_active(now))
    }

    /// Semantic lookup by the textual form a peer deleted with.
    ///
    /// K-lines split on `@`, D-lines compare the IP literal, resv and
    /// nick-delay compare the mask.
    pub fn by_user_input(&self, kind: BanType, text: &str) -> Option<&Ban> {
        self.bans.values().find(|b| {
            if b.kind != kind {
                return false;
            }
            match kind {
                BanType::Kline => match text.split_once('@') {
                    Some((u, h)) => {
                        b.match_user.as_deref().is_some_and(|mu| irc_eq(mu, u))
                            && b.match_host.as_deref().is_some_and(|mh| irc_eq(mh, h))
                    }
                    None => irc_eq(&b.mask, text),
                },
                BanType::Dline | BanType::Resv | BanType::NickDelay => irc_eq(&b.mask, text),
            }
        })
    }

    /// First active ban matching this user, if any.
    pub fn find_matching(&self, user: &User, now: i64) -> Option<&Ban> {
        self.active(now).find(|b| b.matches(user))
    }

    /// Whether an active nick-delay or resv reserves this nick.
    pub fn nick_delayed(&self, nick: &str, now: i64) -> bool {
        self.active(now).any(|b| b.matches_name(nick))
    }

    /// Drop every record past its lifetime. Returns how many went.
    pub fn prune(&mut self, now: i64) -> usize {
        let before = self.bans.len();
        self.bans.retain(|_, b| !b.should_prune(now));
        before - self.bans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Uid;
    use std::collections::HashSet;

    fn kline(mask: &str, now: i64, duration: i64, lifetime: i64) -> Ban {
        Ban::new(BanType::Kline, Sid(1), mask, "spam", now, duration, lifetime)
    }

    fn victim() -> User {
        User {
            uid: Uid { sid: Sid(2), n: 1 },
            nick: "victim".into(),
            ident: "evil".into(),
            host: "bad.example.net".into(),
            cloak: "bad.example.net".into(),
            ip: Some("10.1.2.3".into()),
            real: String::new(),
            account: None,
            modes: HashSet::new(),
            nick_time: 0,
            server: Sid(2),
            location: Sid(2),
            channels: Vec::new(),
        }
    }

    #[test]
    fn test_fnv1a_reference_values() {
        // Standard FNV-1a 32 test vectors.
        assert_eq!(fnv1a_32(""), 0x811c_9dc5);
        assert_eq!(fnv1a_32("a"), 0xe40c_292c);
        assert_eq!(fnv1a_32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_ban_id_is_case_normalized() {
        assert_eq!(ban_id(Sid(1), "*@Bad.NET"), ban_id(Sid(1), "*@bad.net"));
        assert_ne!(ban_id(Sid(1), "*@bad.net"), ban_id(Sid(2), "*@bad.net"));
        assert_eq!(
            ban_id(Sid(1), "x"),
            format!("1.{}", fnv1a_32("x"))
        );
    }

    #[test]
    fn test_lifecycle_invariants() {
        let b = kline("*@bad.example.net", 1000, 300, 600);
        assert_eq!(b.expires(), 1300);
        assert_eq!(b.lifetime_end(), 1600);
        assert!(b.expires() >= b.modified);
        assert!(b.lifetime_end() >= b.expires());
        assert!(b.is_active(1299));
        assert!(!b.is_active(1300));
        assert!(!b.should_prune(1599));
        assert!(b.should_prune(1600));
    }

    #[test]
    fn test_lifetime_never_below_duration() {
        let b = kline("*@x", 0, 300, 100);
        assert_eq!(b.lifetime, 300);
    }

    #[test]
    fn test_kline_matches_host_and_ip() {
        let by_host = kline("*@*.example.net", 0, 300, 300);
        let by_ip = kline("evil@10.1.*", 0, 300, 300);
        let u = victim();
        assert!(by_host.matches(&u));
        assert!(by_ip.matches(&u));
        assert!(!kline("*@*.other.org", 0, 300, 300).matches(&u));
    }

    #[test]
    fn test_dline_and_resv_matching() {
        let d = Ban::new(BanType::Dline, Sid(1), "10.1.2.*", "bad net", 0, 300, 300);
        assert!(d.matches(&victim()));
        let r = Ban::new(BanType::Resv, Sid(1), "#bad*", "no", 0, 300, 300);
        assert!(r.matches_name("#badchan"));
        assert!(!r.matches_name("#good"));
    }

    #[test]
    fn test_upsert_newer_wins() {
        let mut store = BanStore::new();
        store.upsert(kline("*@bad.net", 1000, 300, 600));
        let mut update = kline("*@bad.net", 1000, 300, 600);
        update.modified = 1100;
        update.duration = 0; // deletion
        update.reason = "gone".into();
        let b = store.upsert(update);
        assert_eq!(b.duration, 0);
        assert_eq!(b.reason, "gone");
        assert_eq!(b.added, 1000);
        assert!(!b.is_active(1100));
    }

    #[test]
    fn test_upsert_older_only_extends_lifetime() {
        let mut store = BanStore::new();
        let mut current = kline("*@bad.net", 1000, 300, 600);
        current.modified = 1200;
        store.upsert(current);
        let mut stale = kline("*@bad.net", 1000, 900, 2000);
        stale.modified = 1100;
        stale.reason = "stale".into();
        let b = store.upsert(stale);
        assert_eq!(b.modified, 1200);
        assert_eq!(b.reason, "spam");
        assert_eq!(b.lifetime, 2000);
    }

    #[test]
    fn test_by_user_input() {
        let mut store = BanStore::new();
        store.upsert(kline("Evil@Bad.NET", 0, 300, 300));
        assert!(store.by_user_input(BanType::Kline, "evil@bad.net").is_some());
        assert!(store.by_user_input(BanType::Kline, "evil@other.net").is_none());
        assert!(store.by_user_input(BanType::Dline, "evil@bad.net").is_none());
    }

    #[test]
    fn test_prune_and_active() {
        let mut store = BanStore::new();
        store.upsert(kline("*@a", 1000, 300, 600));
        store.upsert(kline("*@b", 1000, 9000, 9000));
        // Expired but within lifetime: retained, not advertised.
        assert_eq!(store.active(1400).count(), 1);
        assert_eq!(store.prune(1400), 0);
        // Past lifetime: pruned.
        assert_eq!(store.prune(1700), 1);
        assert_eq!(store.all().count(), 1);
    }

    #[test]
    fn test_nick_delayed() {
        let mut store = BanStore::new();
        store.upsert(Ban::new(
            BanType::NickDelay,
            Sid(1),
            "services",
            "held",
            1000,
            60,
            60,
        ));
        assert!(store.nick_delayed("Services", 1030));
        assert!(!store.nick_delayed("Services", 1060));
        assert!(!store.nick_delayed("other", 1030));
    }
}
