//! Error types for SMTP submission.

use std::io;
use std::time::Duration;

use crate::command::ReplyRange;
use crate::types::{ReplyCode, VerificationResult};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error below the protocol layer (connect, send, receive).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// The server certificate failed verification and the policy requires it.
    #[error("server certificate rejected: {0}")]
    Verification(VerificationResult),

    /// Server replied with a code outside the accepted range.
    #[error("{command}: server responded with {code} (expected {expected}): {message}")]
    UnexpectedReply {
        /// Command that triggered the reply (credentials redacted).
        command: String,
        /// Reply code received.
        code: ReplyCode,
        /// Accepted range for the command.
        expected: ReplyRange,
        /// Reply text.
        message: String,
    },

    /// The stream ended before a final reply line was seen.
    #[error("connection closed before a reply code was received")]
    NoReplyCode,

    /// A reply line exceeded the configured maximum length.
    #[error("reply line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid configuration option.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Certificate or key material could not be provisioned.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// An I/O deadline elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns true if the server answered but the reply was not accepted.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedReply { .. } | Self::NoReplyCode | Self::LineTooLong(_)
        )
    }

    /// Returns the reply code carried by a protocol error, if any.
    #[must_use]
    pub const fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Self::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent rejection (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if code.is_permanent())
    }

    /// Returns true if this is a transient rejection (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UnexpectedReply { code, .. } if code.is_transient())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn rejected(code: u16) -> Error {
        Error::UnexpectedReply {
            command: "RCPT TO:<a@b>".into(),
            code: ReplyCode::new(code),
            expected: ReplyRange::POSITIVE,
            message: "nope".into(),
        }
    }

    #[test]
    fn classifies_rejections() {
        assert!(rejected(550).is_permanent());
        assert!(!rejected(550).is_transient());
        assert!(rejected(451).is_transient());
        assert!(rejected(451).is_protocol());
        assert_eq!(rejected(451).reply_code(), Some(ReplyCode::new(451)));
    }

    #[test]
    fn io_errors_are_not_protocol_errors() {
        let err = Error::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!err.is_protocol());
        assert_eq!(err.reply_code(), None);
    }

    #[test]
    fn unexpected_reply_display_names_command_and_range() {
        let text = rejected(300).to_string();
        assert_eq!(
            text,
            "RCPT TO:<a@b>: server responded with 300 (expected [200,299]): nope"
        );
    }
}
