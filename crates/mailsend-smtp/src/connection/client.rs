//! Command/reply sequencing.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{with_deadline, write_fully};
use crate::command::{Command, ReplyRange};
use crate::error::{Error, Result};
use crate::parser::{ParserLimits, ReplyParser};
use crate::types::Reply;

/// One request/response exchange at a time over a channel.
///
/// Every reply is checked against the range the caller accepts; a code
/// outside it is reported as [`Error::UnexpectedReply`].
#[derive(Debug)]
pub struct Connection<C> {
    stream: C,
    parser: ReplyParser,
    io_timeout: Option<Duration>,
}

impl<C> Connection<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a channel.
    pub const fn new(stream: C, limits: ParserLimits, io_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            parser: ReplyParser::new(limits),
            io_timeout,
        }
    }

    /// Reads the server greeting without sending anything.
    ///
    /// # Errors
    ///
    /// Returns an I/O or parse error, or [`Error::UnexpectedReply`].
    pub async fn read_greeting(&mut self, range: ReplyRange) -> Result<Reply> {
        let reply = self.read_reply().await?;
        check("<greeting>", &reply, range)?;
        Ok(reply)
    }

    /// Sends `command` and waits for a reply within `range`.
    ///
    /// # Errors
    ///
    /// Returns an I/O or parse error, or [`Error::UnexpectedReply`].
    pub async fn execute(&mut self, command: &Command, range: ReplyRange) -> Result<Reply> {
        debug!("> {command}");
        self.write_data(&command.serialize()).await?;
        let reply = self.read_reply().await?;
        check(&command.to_string(), &reply, range)?;
        Ok(reply)
    }

    /// Writes raw bytes without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<()> {
        with_deadline(self.io_timeout, write_fully(&mut self.stream, data)).await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let reply =
            with_deadline(self.io_timeout, self.parser.read_reply(&mut self.stream)).await?;
        for line in &reply.lines {
            debug!("< {line}");
        }
        Ok(reply)
    }

    /// Returns a reference to the channel.
    pub const fn get_ref(&self) -> &C {
        &self.stream
    }

    /// Returns a mutable reference to the channel.
    pub const fn get_mut(&mut self) -> &mut C {
        &mut self.stream
    }

    /// Unwraps the channel.
    pub fn into_inner(self) -> C {
        self.stream
    }
}

fn check(command: &str, reply: &Reply, range: ReplyRange) -> Result<()> {
    if range.contains(reply.code) {
        return Ok(());
    }
    Err(Error::UnexpectedReply {
        command: command.to_string(),
        code: reply.code,
        expected: range,
        message: reply.text(),
    })
}
