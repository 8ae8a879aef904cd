//! The message handed to the server after `DATA`.

use super::Address;
use crate::config::Config;
use crate::error::{Error, Result};

/// Literal sequence that ends the `DATA` phase.
pub const TERMINATOR: &[u8] = b"\r\n.\r\n";

/// Body sent when no `body_file` is configured.
pub const DEFAULT_BODY: &str = "This is a simple test mail from the mailsend client.\n\nEnjoy!";

/// A single message: envelope addresses, header block and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Envelope sender.
    pub from: Address,
    /// Envelope recipient.
    pub to: Address,
    /// Header fields in the order they are written.
    pub headers: Vec<(String, String)>,
    /// Body text. Line endings are normalised when encoded.
    pub body: String,
}

impl Message {
    /// Creates a message with `From`, `To`, `Subject` and `Date` headers.
    #[must_use]
    pub fn new(from: Address, to: Address, subject: &str, body: impl Into<String>) -> Self {
        let headers = vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), to.to_string()),
            ("Subject".to_string(), subject.to_string()),
            ("Date".to_string(), chrono::Local::now().to_rfc2822()),
        ];
        Self {
            from,
            to,
            headers,
            body: body.into(),
        }
    }

    /// Composes the message described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `body_file` cannot be read.
    pub fn compose(config: &Config) -> Result<Self> {
        let body = match &config.body_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read body_file {}: {e}", path.display()))
            })?,
            None => DEFAULT_BODY.to_string(),
        };
        Ok(Self::new(
            config.mail_from.clone(),
            config.mail_to.clone(),
            &config.subject,
            body,
        ))
    }

    /// Returns the value of the first header with the given name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Encodes headers and body for the `DATA` phase.
    ///
    /// Lines are joined with CRLF and lines starting with `.` are
    /// dot-stuffed. The result carries no trailing line break;
    /// [`TERMINATOR`] supplies it.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");

        let body = self.body.strip_suffix('\n').unwrap_or(&self.body);
        for (i, line) in body.split('\n').enumerate() {
            if i > 0 {
                out.extend_from_slice(b"\r\n");
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with('.') {
                out.push(b'.');
            }
            out.extend_from_slice(line.as_bytes());
        }
        out
    }
}
