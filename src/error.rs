//! Error handling for the mesh core.
//!
//! Every inbound frame handler returns [`HandlerResult`]. Failures are
//! local: a non-fatal error drops the offending frame and surfaces an
//! operator notice at most once per (peer, kind) pair; the only fatal
//! error is a UID collision, which tears the offending link down.

use thiserror::Error;

/// Errors raised while decoding or applying a TS6 frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("malformed frame: {0}")]
    BadFrame(String),

    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("unknown ban type: {0}")]
    UnknownBanType(char),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// Duplicate UID introduced by a peer. Fatal for the link.
    #[error("UID collision: {0}")]
    UidCollision(String),

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    /// No user or server is available to attribute an outbound ban to.
    #[error("no suitable source for {0}")]
    NoSource(String),
}

impl ProtoError {
    /// Static label for this error kind.
    ///
    /// Used as the dedup key for once-per-(peer, kind) operator notices.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::BadFrame(_) => "bad_frame",
            Self::BadParameter(_) => "bad_parameter",
            Self::UnknownBanType(_) => "unknown_ban_type",
            Self::UnknownServer(_) => "unknown_server",
            Self::UidCollision(_) => "uid_collision",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::NoSource(_) => "no_source",
        }
    }

    /// Whether this error requires disconnecting the offending link.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UidCollision(_))
    }
}

/// Result type for frame handlers.
pub type HandlerResult = Result<(), ProtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ProtoError::NeedMoreParams.error_code(), "need_more_params");
        assert_eq!(
            ProtoError::UidCollision("001AAAAAB".into()).error_code(),
            "uid_collision"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ProtoError::UidCollision("x".into()).is_fatal());
        assert!(!ProtoError::BadFrame("x".into()).is_fatal());
        assert!(!ProtoError::NoSuchNick("x".into()).is_fatal());
    }
}
