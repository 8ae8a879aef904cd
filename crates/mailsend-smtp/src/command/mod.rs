//! SMTP commands and the reply ranges they accept.

use std::fmt;

use crate::types::{Address, ReplyCode, TERMINATOR};

/// Inclusive range of reply codes a command accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyRange {
    /// Lowest accepted code.
    pub min: u16,
    /// Highest accepted code.
    pub max: u16,
}

impl ReplyRange {
    /// `[200,299]`
    pub const POSITIVE: Self = Self::new(200, 299);
    /// `[300,399]`
    pub const INTERMEDIATE: Self = Self::new(300, 399);
    /// `[200,399]`
    pub const POSITIVE_OR_INTERMEDIATE: Self = Self::new(200, 399);

    /// Creates a range accepting `min..=max`.
    #[must_use]
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// Returns true if `code` lies within the range.
    #[must_use]
    pub const fn contains(self, code: ReplyCode) -> bool {
        self.min <= code.as_u16() && code.as_u16() <= self.max
    }
}

impl fmt::Display for ReplyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.min, self.max)
    }
}

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH LOGIN - Begin the LOGIN exchange
    AuthLogin,
    /// Base64 username line of the LOGIN exchange
    AuthUsername(String),
    /// Base64 password line of the LOGIN exchange
    AuthPassword(String),
    /// MAIL FROM - Start mail transaction
    MailFrom(Address),
    /// RCPT TO - Add recipient
    RcptTo(Address),
    /// DATA - Begin message data
    Data,
    /// End-of-data terminator line
    EndOfData,
}

impl Command {
    /// Serializes the command to the bytes written on the wire.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::AuthLogin => buf.extend_from_slice(b"AUTH LOGIN"),
            Self::AuthUsername(encoded) | Self::AuthPassword(encoded) => {
                buf.extend_from_slice(encoded.as_bytes());
            }
            Self::MailFrom(from) => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo(to) => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::Data => buf.extend_from_slice(b"DATA"),
            // The terminator carries its own line breaks.
            Self::EndOfData => return TERMINATOR.to_vec(),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the reply range this command accepts in a submission session.
    #[must_use]
    pub const fn expected(&self) -> ReplyRange {
        match self {
            Self::AuthLogin | Self::AuthPassword(_) => ReplyRange::POSITIVE_OR_INTERMEDIATE,
            Self::AuthUsername(_) | Self::Data => ReplyRange::INTERMEDIATE,
            Self::Ehlo { .. }
            | Self::StartTls
            | Self::MailFrom(_)
            | Self::RcptTo(_)
            | Self::EndOfData => ReplyRange::POSITIVE,
        }
    }
}

/// Diagnostic form of the command. Credential lines are redacted.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::AuthLogin => f.write_str("AUTH LOGIN"),
            Self::AuthUsername(_) => f.write_str("<username>"),
            Self::AuthPassword(_) => f.write_str("<password>"),
            Self::MailFrom(from) => write!(f, "MAIL FROM:<{from}>"),
            Self::RcptTo(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::EndOfData => f.write_str("<end of data>"),
        }
    }
}
