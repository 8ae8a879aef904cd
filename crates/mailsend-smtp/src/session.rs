//! Submission session: one message, start to finish.
//!
//! The session walks a fixed sequence of phases:
//!
//! ```text
//! ImplicitTls: HandshakeInitial -> GreetingSecure ---------------------------+
//! StartTls:    GreetingPlain -> StartTlsUpgrade -> HandshakeSecure ----------+
//!                                                                            |
//!   [Authenticating] -> Envelope -> DataTransfer -> Closing -> Done  <-------+
//! ```
//!
//! Any failure stops the sequence. Success and failure share a single
//! teardown, which shuts the channel down and releases it; the error is then
//! reported together with the phase it occurred in.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::auth::auth_login;
use crate::command::{Command, ReplyRange};
use crate::config::{Config, Mode, VerifyMode};
use crate::connection::{Channel, Connection, connect, with_deadline};
use crate::error::{Error, Result};
use crate::tls::{CredentialProvider, RustlsUpgrade, TlsUpgrade};
use crate::types::{AuthMechanism, Capabilities, Message, Reply, VerificationResult};

/// Session phase, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Opening the TCP connection.
    Connecting,
    /// Reading the banner and sending `EHLO` in the clear.
    GreetingPlain,
    /// Reading the banner and sending `EHLO` over TLS.
    GreetingSecure,
    /// TLS handshake right after connecting.
    HandshakeInitial,
    /// Sending `STARTTLS`.
    StartTlsUpgrade,
    /// TLS handshake after `STARTTLS`.
    HandshakeSecure,
    /// `AUTH LOGIN` exchange.
    Authenticating,
    /// `MAIL FROM` and `RCPT TO`.
    Envelope,
    /// `DATA`, message and terminator.
    DataTransfer,
    /// Channel shutdown.
    Closing,
    /// Finished.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::GreetingPlain => "greeting",
            Self::GreetingSecure => "secure greeting",
            Self::HandshakeInitial => "TLS handshake",
            Self::StartTlsUpgrade => "STARTTLS",
            Self::HandshakeSecure => "STARTTLS handshake",
            Self::Authenticating => "authentication",
            Self::Envelope => "envelope",
            Self::DataTransfer => "data transfer",
            Self::Closing => "closing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A failed session: the error and the phase it ended in.
#[derive(Debug, thiserror::Error)]
#[error("{phase} failed: {source}")]
pub struct SessionError {
    /// Phase in which the session failed.
    pub phase: Phase,
    /// Underlying error.
    #[source]
    pub source: Error,
}

impl SessionError {
    /// Creates a session error.
    #[must_use]
    pub const fn new(phase: Phase, source: Error) -> Self {
        Self { phase, source }
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Negotiated cipher suite.
    pub cipher_suite: String,
    /// Negotiated protocol version, if known.
    pub protocol: Option<String>,
    /// Certificate findings from the handshake.
    pub verification: VerificationResult,
    /// Server reply to the end of data.
    pub reply: Reply,
}

/// One submission session over a transport `S`.
pub struct Session<'a, S, U>
where
    U: TlsUpgrade<S>,
{
    config: &'a Config,
    conn: Connection<Channel<S, U::Stream>>,
    upgrader: U,
    phase: Phase,
    capabilities: Capabilities,
}

impl<S, U> fmt::Debug for Session<'_, S, U>
where
    U: TlsUpgrade<S>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("server_name", &self.config.server_name)
            .field("mode", &self.config.mode)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<'a, S, U> Session<'a, S, U>
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: TlsUpgrade<S>,
{
    /// Creates a session over a connected transport.
    pub const fn new(config: &'a Config, stream: S, upgrader: U) -> Self {
        Self {
            config,
            conn: Connection::new(Channel::Plain(stream), config.limits, config.io_timeout),
            upgrader,
            phase: Phase::Connecting,
            capabilities: Capabilities {
                hostname: String::new(),
                extensions: Vec::new(),
            },
        }
    }

    /// Delivers `message` and closes the session.
    ///
    /// # Errors
    ///
    /// Returns the first error along with the phase it occurred in. The
    /// channel has been released by the time this returns.
    pub async fn deliver(mut self, message: &Message) -> std::result::Result<Delivery, SessionError> {
        let outcome = self.run(message).await;
        let failed_in = self.phase;
        self.teardown().await;

        match outcome {
            Ok(delivery) => {
                self.phase = Phase::Done;
                info!("Message delivered: {}", delivery.reply.text());
                Ok(delivery)
            }
            Err(source) => Err(SessionError::new(failed_in, source)),
        }
    }

    async fn run(&mut self, message: &Message) -> Result<Delivery> {
        let config = self.config;
        let hostname = config.local_hostname();

        match config.mode {
            Mode::ImplicitTls => {
                self.phase = Phase::HandshakeInitial;
                self.secure().await?;
                self.phase = Phase::GreetingSecure;
                self.greet(&hostname).await?;
            }
            Mode::StartTls => {
                self.phase = Phase::GreetingPlain;
                self.greet(&hostname).await?;
                if !self.capabilities.supports_starttls() {
                    warn!("{} does not advertise STARTTLS", self.capabilities.hostname);
                }

                self.phase = Phase::StartTlsUpgrade;
                info!("Sending STARTTLS");
                let starttls = Command::StartTls;
                self.conn.execute(&starttls, starttls.expected()).await?;

                // The session continues without a second EHLO.
                self.phase = Phase::HandshakeSecure;
                self.secure().await?;
            }
        }

        if let Some(credentials) = &config.credentials {
            self.phase = Phase::Authenticating;
            if !self.capabilities.supports_auth(AuthMechanism::Login) {
                warn!("AUTH LOGIN not advertised, trying anyway");
            }
            auth_login(&mut self.conn, credentials).await?;
        }

        let wire = message.to_wire();
        let size = wire.len();
        if let Some(limit) = self.capabilities.max_message_size().filter(|&limit| size > limit) {
            warn!("message is {size} bytes, server limit is {limit}");
        }

        self.phase = Phase::Envelope;
        info!("Sending the envelope");
        let mail_from = Command::MailFrom(message.from.clone());
        self.conn.execute(&mail_from, mail_from.expected()).await?;
        let rcpt_to = Command::RcptTo(message.to.clone());
        self.conn.execute(&rcpt_to, rcpt_to.expected()).await?;

        self.phase = Phase::DataTransfer;
        info!("Writing the message");
        let data = Command::Data;
        self.conn.execute(&data, data.expected()).await?;
        self.conn.write_data(&wire).await?;
        let end = Command::EndOfData;
        let reply = self.conn.execute(&end, end.expected()).await?;

        let secure = self
            .conn
            .get_ref()
            .secure()
            .ok_or_else(|| Error::InvalidState("delivered without TLS".into()))?;
        Ok(Delivery {
            cipher_suite: secure.cipher_suite().to_string(),
            protocol: secure.protocol().map(str::to_string),
            verification: secure.verify(),
            reply,
        })
    }

    /// Reads the banner and sends `EHLO`.
    async fn greet(&mut self, hostname: &str) -> Result<()> {
        info!("Reading the greeting");
        self.conn.read_greeting(ReplyRange::POSITIVE).await?;

        info!("Sending EHLO {hostname}");
        let ehlo = Command::Ehlo {
            hostname: hostname.to_string(),
        };
        let reply = self.conn.execute(&ehlo, ehlo.expected()).await?;
        self.capabilities = Capabilities::from_ehlo(&reply);
        Ok(())
    }

    /// Upgrades the channel and applies the verification policy.
    async fn secure(&mut self) -> Result<()> {
        let config = self.config;
        with_deadline(
            config.io_timeout,
            self.conn.get_mut().upgrade(&self.upgrader),
        )
        .await?;

        let secure = self
            .conn
            .get_ref()
            .secure()
            .ok_or_else(|| Error::InvalidState("handshake produced no channel".into()))?;
        info!(
            "TLS established: {} ({})",
            secure.cipher_suite(),
            secure.protocol().unwrap_or("unknown protocol")
        );

        let findings = secure.verify();
        if findings.is_verified() {
            info!("Server certificate verified");
            return Ok(());
        }
        for finding in findings.findings(&config.server_name) {
            warn!("{finding}");
        }
        match config.verify {
            VerifyMode::Optional => Ok(()),
            VerifyMode::Required => Err(Error::Verification(findings)),
        }
    }

    /// Shuts the channel down. Runs once, after success or failure.
    async fn teardown(&mut self) {
        self.phase = Phase::Closing;
        if let Err(e) = self.conn.get_mut().close().await {
            warn!("closing the connection failed: {e}");
        }
    }
}

/// Connects, delivers `message` and closes, using rustls for TLS.
///
/// # Errors
///
/// Returns the first error along with the phase it occurred in.
pub async fn send_mail(
    config: &Config,
    credentials: &dyn CredentialProvider,
    message: &Message,
) -> std::result::Result<Delivery, SessionError> {
    let upgrader = RustlsUpgrade::new(config, credentials)
        .map_err(|e| SessionError::new(Phase::Connecting, e))?;
    let stream: TcpStream = connect(&config.server_name, config.server_port, config.connect_timeout)
        .await
        .map_err(|e| SessionError::new(Phase::Connecting, e))?;
    Session::new(config, stream, upgrader).deliver(message).await
}
