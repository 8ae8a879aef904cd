//! SMTP reply parser.
//!
//! Replies are read in chunks and scanned line by line. The first line whose
//! first four bytes are three ASCII digits followed by a space ends the
//! reply:
//!
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
//!
//! Every other line (continuation, malformed, too short) is kept as text and
//! otherwise ignored. Bytes that follow the final line within the same read
//! are dropped.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::connection::is_retryable;
use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Bytes requested from the channel per read.
pub const DEFAULT_READ_CHUNK: usize = 127;

/// Longest reply line accepted, terminator excluded.
pub const DEFAULT_MAX_LINE: usize = 1024;

/// Buffer limits for [`ReplyParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Bytes requested per read.
    pub read_chunk: usize,
    /// Longest accepted line.
    pub max_line: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

/// Incremental reply parser.
///
/// Carries a partial line across reads; all state is dropped once a reply
/// completes.
#[derive(Debug, Default)]
pub struct ReplyParser {
    limits: ParserLimits,
    line: Vec<u8>,
    lines: Vec<String>,
}

impl ReplyParser {
    /// Creates a parser with the given limits.
    #[must_use]
    pub const fn new(limits: ParserLimits) -> Self {
        Self {
            limits,
            line: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Feeds bytes to the parser.
    ///
    /// Returns `Ok(Some(reply))` as soon as a final line is seen; the rest of
    /// `bytes` is discarded. Returns `Ok(None)` if more input is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] if a line outgrows the limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<Reply>> {
        for &byte in bytes {
            if byte != b'\n' {
                if self.line.len() >= self.limits.max_line {
                    self.reset();
                    return Err(Error::LineTooLong(self.limits.max_line));
                }
                self.line.push(byte);
                continue;
            }

            let mut line = std::mem::take(&mut self.line);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let code = final_line_code(&line);
            self.lines.push(String::from_utf8_lossy(&line).into_owned());

            if let Some(code) = code {
                let lines = std::mem::take(&mut self.lines);
                self.reset();
                return Ok(Some(Reply::new(code, lines)));
            }
        }

        Ok(None)
    }

    /// Reads from `reader` until a reply completes.
    ///
    /// Would-block and interrupted reads are retried without bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReplyCode`] if the stream ends first, or the
    /// underlying I/O error.
    pub async fn read_reply<R>(&mut self, reader: &mut R) -> Result<Reply>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut chunk = vec![0u8; self.limits.read_chunk.max(1)];
        loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => {
                    self.reset();
                    return Err(Error::NoReplyCode);
                }
                Ok(n) => n,
                Err(e) if is_retryable(&e) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => {
                    self.reset();
                    return Err(e.into());
                }
            };

            trace!("read {n} bytes: {:?}", String::from_utf8_lossy(&chunk[..n]));
            if let Some(reply) = self.feed(&chunk[..n])? {
                return Ok(reply);
            }
        }
    }

    fn reset(&mut self) {
        self.line.clear();
        self.lines.clear();
    }
}

/// Returns the code of a final reply line (`DDD ` prefix), if `line` is one.
#[must_use]
pub fn final_line_code(line: &[u8]) -> Option<ReplyCode> {
    match line {
        [a, b, c, b' ', ..]
            if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() =>
        {
            let digit = |d: &u8| u16::from(d - b'0');
            Some(ReplyCode::new(digit(a) * 100 + digit(b) * 10 + digit(c)))
        }
        _ => None,
    }
}
