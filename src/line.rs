//! TS6 wire frame parsing and assembly.
//!
//! A frame is a single space-separated line. An optional `:`-prefixed
//! source token comes first, then the command, then parameters; a
//! parameter starting with `:` swallows the rest of the line (the
//! trailing parameter). Transport framing (CRLF, buffering) is the
//! embedding daemon's concern.

use std::fmt;

use crate::error::ProtoError;

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Source token without the leading `:` (a SID or UID), if present.
    pub source: Option<String>,
    /// Command, as received.
    pub command: String,
    /// Positional parameters; the trailing parameter is the last element.
    pub args: Vec<String>,
}

impl Frame {
    /// Build a frame from parts.
    pub fn new<S: Into<String>>(source: Option<S>, command: &str, args: Vec<String>) -> Self {
        Self {
            source: source.map(Into::into),
            command: command.to_string(),
            args,
        }
    }

    /// Parse one line. Leading/trailing line terminators are tolerated.
    pub fn parse(line: &str) -> Result<Self, ProtoError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut rest = line.trim_start();
        if rest.is_empty() {
            return Err(ProtoError::BadFrame("empty line".into()));
        }

        let mut source = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (tok, after) = split_word(stripped);
            if tok.is_empty() {
                return Err(ProtoError::BadFrame("empty source".into()));
            }
            source = Some(tok.to_string());
            rest = after;
        }

        let (command, mut rest) = split_word(rest);
        if command.is_empty() {
            return Err(ProtoError::BadFrame("missing command".into()));
        }

        let mut args = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                args.push(trailing.to_string());
                break;
            }
            let (tok, after) = split_word(rest);
            args.push(tok.to_string());
            rest = after;
        }

        Ok(Self {
            source,
            command: command.to_string(),
            args,
        })
    }

    /// Parameter at `i`, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    /// Parameter at `i`, or a need-more-params error.
    pub fn req(&self, i: usize) -> Result<&str, ProtoError> {
        self.arg(i).ok_or(ProtoError::NeedMoreParams)
    }
}

impl fmt::Display for Frame {
    /// Serialize back to wire form (no line terminator).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(src) = &self.source {
            write!(f, ":{} ", src)?;
        }
        write!(f, "{}", self.command)?;
        let last = self.args.len().saturating_sub(1);
        for (i, a) in self.args.iter().enumerate() {
            if i == last && (a.is_empty() || a.contains(' ') || a.starts_with(':')) {
                write!(f, " :{}", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        Ok(())
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(i) => (&s[..i], s[i + 1..].trim_start()),
        None => (s, ""),
    }
}
