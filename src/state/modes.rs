//! Channel mode registry.
//!
//! Each server perspective owns a table mapping mode letters to internal
//! mode names and back. All engine logic works on names; letters only
//! appear at the wire boundary, so two peers may disagree about letters
//! without confusing the state machine.

use std::collections::HashMap;

use tracing::warn;

/// Behavioral class of a channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Flag with no parameter (`+n`).
    Normal,
    /// Parameter on set and unset (`+f target`).
    Parameter,
    /// Parameter on set only (`+l 10`).
    ParameterSet,
    /// Mask list (`+b mask`).
    List,
    /// Membership status (`+o uid`).
    Status,
    /// Channel key: parameter on set, optional junk parameter on unset.
    Key,
}

/// One requested or committed mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    /// Internal mode name.
    pub name: String,
    /// `true` for `+`, `false` for `-`.
    pub state: bool,
    /// Parameter, if the mode takes one here.
    pub param: Option<String>,
}

impl ModeChange {
    /// Convenience constructor.
    pub fn new(name: &str, state: bool, param: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            state,
            param: param.map(str::to_string),
        }
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: !self.state,
            param: self.param.clone(),
        }
    }
}

/// Status-mode particulars: wire letter, NAMES prefix, privilege level.
#[derive(Debug, Clone, Copy)]
pub struct StatusMode {
    /// Mode letter (`o`).
    pub letter: char,
    /// Nick prefix character (`@`).
    pub prefix: char,
    /// Privilege level; higher outranks lower.
    pub level: u8,
}

/// Letter/name mode table for one perspective.
#[derive(Debug, Default)]
pub struct ModeTable {
    by_letter: HashMap<char, String>,
    by_name: HashMap<String, (char, ModeKind)>,
    status: HashMap<String, StatusMode>,
}

impl ModeTable {
    /// Register a non-status mode.
    pub fn add(&mut self, name: &str, letter: char, kind: ModeKind) {
        debug_assert!(kind != ModeKind::Status, "use add_status");
        self.by_letter.insert(letter, name.to_string());
        self.by_name.insert(name.to_string(), (letter, kind));
    }

    /// Register a status mode with its prefix and level.
    pub fn add_status(&mut self, name: &str, letter: char, prefix: char, level: u8) {
        self.by_letter.insert(letter, name.to_string());
        self.by_name
            .insert(name.to_string(), (letter, ModeKind::Status));
        self.status.insert(
            name.to_string(),
            StatusMode {
                letter,
                prefix,
                level,
            },
        );
    }

    /// The standard TS6 table.
    pub fn ts6_default() -> Self {
        let mut t = Self::default();
        t.add("no_ext", 'n', ModeKind::Normal);
        t.add("protect_topic", 't', ModeKind::Normal);
        t.add("moderated", 'm', ModeKind::Normal);
        t.add("invite_only", 'i', ModeKind::Normal);
        t.add("secret", 's', ModeKind::Normal);
        t.add("private", 'p', ModeKind::Normal);
        t.add("forward", 'f', ModeKind::Parameter);
        t.add("limit", 'l', ModeKind::ParameterSet);
        t.add("key", 'k', ModeKind::Key);
        t.add("ban", 'b', ModeKind::List);
        t.add("except", 'e', ModeKind::List);
        t.add("invite_except", 'I', ModeKind::List);
        t.add("access", 'A', ModeKind::List);
        t.add_status("owner", 'q', '~', 4);
        t.add_status("admin", 'a', '&', 3);
        t.add_status("op", 'o', '@', 2);
        t.add_status("halfop", 'h', '%', 1);
        t.add_status("voice", 'v', '+', 0);
        t
    }

    /// Mode name for a letter.
    pub fn name_of(&self, letter: char) -> Option<&str> {
        self.by_letter.get(&letter).map(String::as_str)
    }

    /// Letter for a mode name.
    pub fn letter_of(&self, name: &str) -> Option<char> {
        self.by_name.get(name).map(|(l, _)| *l)
    }

    /// Kind of a mode name.
    pub fn kind_of(&self, name: &str) -> Option<ModeKind> {
        self.by_name.get(name).map(|(_, k)| *k)
    }

    /// Status particulars for a status-mode name.
    pub fn status_info(&self, name: &str) -> Option<StatusMode> {
        self.status.get(name).copied()
    }

    /// Status-mode name owning a NAMES/SJOIN prefix character.
    pub fn status_by_prefix(&self, prefix: char) -> Option<&str> {
        self.status
            .iter()
            .find(|(_, s)| s.prefix == prefix)
            .map(|(n, _)| n.as_str())
    }

    /// All status-mode names, highest level first.
    pub fn statuses_desc(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.status.keys().map(String::as_str).collect();
        names.sort_by_key(|n| std::cmp::Reverse(self.status[*n].level));
        names
    }

    /// Whether a change consumes a parameter in the given direction.
    pub fn takes_param(&self, kind: ModeKind, setting: bool) -> bool {
        match kind {
            ModeKind::Normal => false,
            ModeKind::Parameter | ModeKind::List | ModeKind::Status => true,
            ModeKind::ParameterSet => setting,
            ModeKind::Key => true,
        }
    }

    /// Parse a `+mnt-i`-style mode string against this table.
    ///
    /// Unknown letters are dropped with a warning and consume nothing.
    /// A list mode with no parameter left is kept with `param: None`
    /// (a list view request); a status mode with none is dropped.
    pub fn cmodes_from_string(&self, modestr: &str, params: &[&str]) -> Vec<ModeChange> {
        let mut out = Vec::new();
        let mut state = true;
        let mut pi = 0usize;
        for c in modestr.chars() {
            match c {
                '+' => state = true,
                '-' => state = false,
                _ => {
                    let Some(name) = self.name_of(c) else {
                        warn!(letter = %c, "dropping unknown mode letter");
                        continue;
                    };
                    let kind = self.kind_of(name).unwrap_or(ModeKind::Normal);
                    let mut param = None;
                    if self.takes_param(kind, state) {
                        if pi < params.len() {
                            param = Some(params[pi].to_string());
                            pi += 1;
                        } else if kind == ModeKind::Key && !state {
                            // -k with no junk parameter is fine.
                        } else if kind != ModeKind::List {
                            warn!(mode = %name, "dropping mode missing its parameter");
                            continue;
                        }
                    }
                    out.push(ModeChange {
                        name: name.to_string(),
                        state,
                        param,
                    });
                }
            }
        }
        out
    }

    /// Serialize changes back to `(modestring, params)` pairs.
    ///
    /// With `organize`, positive changes come before negative ones. With
    /// `split`, output is chunked so no pair carries more than that many
    /// parameters.
    pub fn strings_from_cmodes(
        &self,
        changes: &[ModeChange],
        split: Option<usize>,
        organize: bool,
    ) -> Vec<(String, Vec<String>)> {
        let mut ordered: Vec<&ModeChange> = changes.iter().collect();
        if organize {
            // Stable: keeps relative order within each sign.
            ordered.sort_by_key(|c| !c.state);
        }

        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        let mut modestr = String::new();
        let mut params: Vec<String> = Vec::new();
        let mut sign: Option<bool> = None;

        for change in ordered {
            let Some(letter) = self.letter_of(&change.name) else {
                warn!(mode = %change.name, "cannot serialize unknown mode");
                continue;
            };
            if let (Some(limit), Some(_)) = (split, change.param.as_ref()) {
                if params.len() >= limit && !modestr.is_empty() {
                    out.push((std::mem::take(&mut modestr), std::mem::take(&mut params)));
                    sign = None;
                }
            }
            if sign != Some(change.state) {
                modestr.push(if change.state { '+' } else { '-' });
                sign = Some(change.state);
            }
            modestr.push(letter);
            if let Some(p) = &change.param {
                params.push(p.clone());
            }
        }
        if !modestr.is_empty() {
            out.push((modestr, params));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let t = ModeTable::ts6_default();
        let changes = t.cmodes_from_string("+mnt-i", &[]);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0], ModeChange::new("moderated", true, None));
        assert_eq!(changes[3], ModeChange::new("invite_only", false, None));
    }

    #[test]
    fn test_parse_params() {
        let t = ModeTable::ts6_default();
        let changes = t.cmodes_from_string("+ntkl-b", &["sesame", "10", "*!*@spam.net"]);
        assert_eq!(changes[2], ModeChange::new("key", true, Some("sesame")));
        assert_eq!(changes[3], ModeChange::new("limit", true, Some("10")));
        assert_eq!(changes[4], ModeChange::new("ban", false, Some("*!*@spam.net")));
    }

    #[test]
    fn test_parse_unknown_letter_dropped() {
        let t = ModeTable::ts6_default();
        let changes = t.cmodes_from_string("+nX", &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "no_ext");
    }

    #[test]
    fn test_parse_list_view() {
        let t = ModeTable::ts6_default();
        let changes = t.cmodes_from_string("+b", &[]);
        assert_eq!(changes, vec![ModeChange::new("ban", true, None)]);
    }

    #[test]
    fn test_parse_unset_limit_takes_no_param() {
        let t = ModeTable::ts6_default();
        let changes = t.cmodes_from_string("-l+k", &["sesame"]);
        assert_eq!(changes[0], ModeChange::new("limit", false, None));
        assert_eq!(changes[1], ModeChange::new("key", true, Some("sesame")));
    }

    #[test]
    fn test_parse_status_without_target_dropped() {
        let t = ModeTable::ts6_default();
        assert!(t.cmodes_from_string("+o", &[]).is_empty());
    }

    #[test]
    fn test_serialize_organize() {
        let t = ModeTable::ts6_default();
        let changes = vec![
            ModeChange::new("invite_only", false, None),
            ModeChange::new("no_ext", true, None),
            ModeChange::new("op", true, Some("001AAAAAA")),
        ];
        let out = t.strings_from_cmodes(&changes, None, true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "+no-i");
        assert_eq!(out[0].1, vec!["001AAAAAA"]);
    }

    #[test]
    fn test_serialize_split() {
        let t = ModeTable::ts6_default();
        let changes: Vec<ModeChange> = (0..5)
            .map(|i| ModeChange::new("ban", true, Some(&format!("mask{}!*@*", i))))
            .collect();
        let out = t.strings_from_cmodes(&changes, Some(2), false);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, "+bb");
        assert_eq!(out[0].1.len(), 2);
        assert_eq!(out[2].1.len(), 1);
    }

    #[test]
    fn test_status_lookups() {
        let t = ModeTable::ts6_default();
        assert_eq!(t.status_by_prefix('@'), Some("op"));
        assert_eq!(t.status_info("voice").unwrap().level, 0);
        assert_eq!(t.statuses_desc(), vec!["owner", "admin", "op", "halfop", "voice"]);
    }
}
