//! SMTP reply types.

/// A complete SMTP reply, as produced by [`crate::parser::ReplyParser`].
///
/// A `Reply` only exists once a final line (`DDD `) has been seen, so its
/// code is always meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code taken from the final line.
    pub code: ReplyCode,
    /// Every line read for this reply, in order, without line terminators.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the reply text with the `DDD-` / `DDD ` prefixes removed.
    #[must_use]
    pub fn text(&self) -> String {
        self.message_lines().collect::<Vec<_>>().join("\n")
    }

    /// Iterates over the text of each line, prefix removed.
    ///
    /// Lines too short to carry a prefix are yielded unchanged.
    pub fn message_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.get(4..).unwrap_or(line.as_str()))
    }
}

/// SMTP reply code.
///
/// The numeric value is in `0..=999`; it is only produced from three ASCII
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Common reply codes
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 454 TLS not available due to temporary reason
    pub const TLS_UNAVAILABLE: Self = Self(454);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::SERVICE_READY.is_success());
        assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
        assert!(ReplyCode::START_DATA.is_intermediate());
        assert!(ReplyCode::TLS_UNAVAILABLE.is_transient());
        assert!(ReplyCode::AUTH_FAILED.is_permanent());
        assert!(!ReplyCode::AUTH_FAILED.is_success());
    }

    #[test]
    fn display() {
        assert_eq!(ReplyCode::OK.to_string(), "250");
        assert_eq!(ReplyCode::new(7).to_string(), "7");
    }

    #[test]
    fn text_strips_prefixes() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec![
                "250-mail.example.com".to_string(),
                "250-STARTTLS".to_string(),
                "250 AUTH LOGIN PLAIN".to_string(),
            ],
        );
        assert_eq!(reply.text(), "mail.example.com\nSTARTTLS\nAUTH LOGIN PLAIN");
    }

    #[test]
    fn text_keeps_short_lines() {
        let reply = Reply::new(ReplyCode::OK, vec!["ok".to_string(), "250 ".to_string()]);
        assert_eq!(reply.text(), "ok\n");
    }
}
