//! Low-level stream handling.

use std::future::Future;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::is_retryable;
use crate::error::{Error, Result};
use crate::tls::{SecureChannel, TlsUpgrade};

/// Runs `fut`, failing with [`Error::Timeout`] if `deadline` elapses first.
///
/// Without a deadline the future runs to completion.
///
/// # Errors
///
/// Returns the future's own error, or [`Error::Timeout`].
pub async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

/// Connects to a server over TCP.
///
/// # Errors
///
/// Returns an error if the connection fails or the deadline elapses.
pub async fn connect(hostname: &str, port: u16, deadline: Option<Duration>) -> Result<TcpStream> {
    info!("Connecting to {hostname}:{port}");
    let stream = with_deadline(deadline, async {
        Ok(TcpStream::connect((hostname, port)).await?)
    })
    .await?;
    if let Ok(peer) = stream.peer_addr() {
        debug!("connected to {peer}");
    }
    Ok(stream)
}

/// Writes all of `buf` and flushes.
///
/// Partial writes continue from where they stopped; would-block and
/// interrupted writes are retried.
///
/// # Errors
///
/// Returns the first fatal I/O error, or `WriteZero` if the peer stops
/// accepting bytes.
pub async fn write_fully<W>(writer: &mut W, mut buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    while !buf.is_empty() {
        match writer.write(buf).await {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if is_retryable(&e) => tokio::task::yield_now().await,
            Err(e) => return Err(e.into()),
        }
    }

    loop {
        match writer.flush().await {
            Ok(()) => return Ok(()),
            Err(e) if is_retryable(&e) => tokio::task::yield_now().await,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Session channel: plaintext until upgraded, then TLS.
///
/// `Closed` is entered on teardown or when an upgrade consumes the plain
/// stream without producing a secure one. The transport is owned by exactly
/// one variant at a time, so it is released exactly once.
#[derive(Debug)]
pub enum Channel<S, T> {
    /// Plaintext transport.
    Plain(S),
    /// TLS over the transport.
    Secure(Box<SecureChannel<T>>),
    /// Released.
    Closed,
}

impl<S, T> Channel<S, T> {
    /// Returns the TLS channel, if the handshake has completed.
    #[must_use]
    pub fn secure(&self) -> Option<&SecureChannel<T>> {
        match self {
            Self::Secure(channel) => Some(&**channel),
            Self::Plain(_) | Self::Closed => None,
        }
    }

    /// Returns true once the channel has been released.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Hands the plaintext transport to `upgrader` and keeps the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the channel is plaintext, or
    /// the handshake error. After a failed handshake the channel is closed.
    pub async fn upgrade<U>(&mut self, upgrader: &U) -> Result<()>
    where
        U: TlsUpgrade<S, Stream = T>,
    {
        let stream = match mem::replace(self, Self::Closed) {
            Self::Plain(stream) => stream,
            other => {
                *self = other;
                return Err(Error::InvalidState("channel is not plaintext".into()));
            }
        };

        let secure = upgrader.handshake(stream).await?;
        *self = Self::Secure(Box::new(secure));
        Ok(())
    }
}

impl<S, T> Channel<S, T>
where
    S: AsyncWrite + Unpin,
    T: AsyncWrite + Unpin,
{
    /// Shuts the channel down and releases it.
    ///
    /// A TLS channel sends its close notification first. Closing an already
    /// closed channel does nothing.
    ///
    /// # Errors
    ///
    /// Returns the shutdown error; the channel is released regardless.
    pub async fn close(&mut self) -> Result<()> {
        match mem::replace(self, Self::Closed) {
            Self::Plain(mut stream) => stream.shutdown().await?,
            Self::Secure(mut channel) => channel.shutdown().await?,
            Self::Closed => {}
        }
        Ok(())
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

impl<S, T> AsyncRead for Channel<S, T>
where
    S: AsyncRead + Unpin,
    T: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Secure(channel) => Pin::new(&mut **channel).poll_read(cx, buf),
            Self::Closed => Poll::Ready(Err(not_connected())),
        }
    }
}

impl<S, T> AsyncWrite for Channel<S, T>
where
    S: AsyncWrite + Unpin,
    T: AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Secure(channel) => Pin::new(&mut **channel).poll_write(cx, buf),
            Self::Closed => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Secure(channel) => Pin::new(&mut **channel).poll_flush(cx),
            Self::Closed => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Secure(channel) => Pin::new(&mut **channel).poll_shutdown(cx),
            Self::Closed => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    type Plain = Channel<DuplexStream, DuplexStream>;

    #[tokio::test]
    async fn write_fully_retries_would_block() {
        let mut writer = tokio_test::io::Builder::new()
            .write_error(io::ErrorKind::WouldBlock.into())
            .write(b"EHLO ")
            .write(b"client\r\n")
            .build();
        write_fully(&mut writer, b"EHLO client\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn write_fully_reports_fatal_errors() {
        let mut writer = tokio_test::io::Builder::new()
            .write_error(io::ErrorKind::BrokenPipe.into())
            .build();
        let err = write_fully(&mut writer, b"DATA\r\n").await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_elapses() {
        let err = with_deadline(Some(Duration::from_secs(5)), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn no_deadline_runs_to_completion() {
        let value = with_deadline(None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn plain_channel_passes_bytes_through() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel: Plain = Channel::Plain(client);

        write_fully(&mut channel, b"STARTTLS\r\n").await.unwrap();
        let mut buf = [0u8; 10];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"STARTTLS\r\n");
        assert!(channel.secure().is_none());
    }

    #[tokio::test]
    async fn close_releases_once() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut channel: Plain = Channel::Plain(client);

        channel.close().await.unwrap();
        assert!(channel.is_closed());
        // Peer sees end of stream.
        assert_eq!(server.read(&mut [0u8; 4]).await.unwrap(), 0);

        // Second close is a no-op; I/O on a closed channel fails.
        channel.close().await.unwrap();
        let err = write_fully(&mut channel, b"x").await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::NotConnected));
    }
}
