//! Secure channel: TLS handshake, verification result and encrypted I/O.
//!
//! The session never touches rustls directly. It hands a plain stream to a
//! [`TlsUpgrade`] implementation and gets back a [`SecureChannel`] that
//! reports the negotiated cipher suite and the verification findings.

mod connector;
mod provider;
mod verifier;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub use connector::{RustlsUpgrade, available_cipher_suites};
pub use provider::{ClientIdentity, CredentialProvider, PemFiles};
pub use verifier::AdvisoryVerifier;

use crate::error::Result;
use crate::types::VerificationResult;

/// Performs a TLS handshake over a stream.
///
/// Implemented by [`RustlsUpgrade`]; tests substitute their own.
pub trait TlsUpgrade<S> {
    /// Encrypted stream produced by the handshake.
    type Stream: AsyncRead + AsyncWrite + Unpin;

    /// Runs the handshake to completion.
    ///
    /// Would-block conditions are retried until the handshake succeeds or
    /// fails; a failure is reported as [`crate::Error::Handshake`].
    fn handshake(&self, stream: S) -> impl Future<Output = Result<SecureChannel<Self::Stream>>>;
}

/// An established TLS channel.
#[derive(Debug)]
pub struct SecureChannel<T> {
    stream: T,
    cipher_suite: String,
    protocol: Option<String>,
    verification: VerificationResult,
}

impl<T> SecureChannel<T> {
    /// Wraps a stream on which a handshake has completed.
    pub fn new(stream: T, cipher_suite: impl Into<String>, verification: VerificationResult) -> Self {
        Self {
            stream,
            cipher_suite: cipher_suite.into(),
            protocol: None,
            verification,
        }
    }

    /// Records the negotiated protocol version.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Returns the negotiated cipher suite name.
    #[must_use]
    pub fn cipher_suite(&self) -> &str {
        &self.cipher_suite
    }

    /// Returns the negotiated protocol version, if known.
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Returns the certificate verification findings from the handshake.
    #[must_use]
    pub const fn verify(&self) -> VerificationResult {
        self.verification
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for SecureChannel<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for SecureChannel<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    /// Sends the close notification (for TLS streams) and shuts down.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
