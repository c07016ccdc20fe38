//! Casemapping and mask-matching utilities.
//!
//! IRC compares identifiers with the `rfc1459` casemapping, where a few
//! extra characters are case-equivalent (`[`/`{`, `]`/`}`, `\`/`|`,
//! `~`/`^`). Ban masks and list entries match with glob wildcards
//! (`*`, `?`) under the same casemapping.

/// Lowercase a single character under the `rfc1459` casemapping.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        'A'..='Z' => (c as u8 + 32) as char,
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c,
    }
}

/// Lowercase a string under the `rfc1459` casemapping.
pub fn irc_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive equality under the `rfc1459` casemapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    let mut ca = a.chars();
    let mut cb = b.chars();
    loop {
        match (ca.next(), cb.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if irc_lower_char(x) == irc_lower_char(y) => {}
            _ => return false,
        }
    }
}

/// Glob-match `mask` against `text`, case-insensitively.
///
/// `*` matches any run of characters (including none), `?` matches exactly
/// one. This is the matcher used for ban masks, list-mode entries, and
/// K-/D-line evaluation.
pub fn mask_match(mask: &str, text: &str) -> bool {
    let m: Vec<char> = mask.chars().map(irc_lower_char).collect();
    let t: Vec<char> = text.chars().map(irc_lower_char).collect();
    glob(&m, &t)
}

fn glob(mask: &[char], text: &[char]) -> bool {
    match (mask.split_first(), text.split_first()) {
        (None, None) => true,
        (Some(('*', rest)), _) => {
            // Try every possible length for the star, shortest first.
            (0..=text.len()).any(|skip| glob(rest, &text[skip..]))
        }
        (Some(('?', mrest)), Some((_, trest))) => glob(mrest, trest),
        (Some((mc, mrest)), Some((tc, trest))) if mc == tc => glob(mrest, trest),
        _ => false,
    }
}

/// Truncate a string to at most `max` characters without splitting a
/// codepoint. Used to enforce parameter and ban-mask length limits.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Current wall-clock time as Unix seconds.
///
/// The engine itself only ever takes explicit `now` parameters; this is
/// the boundary where the embedding daemon (and the periodic tick) get
/// theirs.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
