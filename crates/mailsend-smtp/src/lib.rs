//! # mailsend-smtp
//!
//! An SMTP submission client that delivers one message over TLS.
//!
//! ## Features
//!
//! - **Implicit TLS** (port 465) and **STARTTLS** (port 587)
//! - **AUTH LOGIN** with base64 credential lines
//! - **Advisory certificate verification**: findings are reported, and only
//!   abort the session when `verify=required`
//! - **Range-checked command sequencing**: every reply is checked against
//!   the codes its command accepts
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsend_smtp::{Config, Message, PemFiles, send_mail};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_options([
//!         "server_name=smtp.example.com",
//!         "mode=1",
//!         "authentication=1",
//!         "user_name=alice",
//!         "user_pwd=secret",
//!         "mail_from=alice@example.com",
//!         "mail_to=bob@example.com",
//!     ])?;
//!     let message = Message::compose(&config)?;
//!     let delivery = send_mail(&config, &PemFiles::from_config(&config), &message).await?;
//!     println!("sent with {}", delivery.cipher_suite);
//!     Ok(())
//! }
//! ```
//!
//! ## Session Phases
//!
//! ```text
//! ┌──────────────┐
//! │  Connecting  │ ─── mode=0 ───→ HandshakeInitial ───→ GreetingSecure ──┐
//! └──────────────┘                                                        │
//!        │                                                                │
//!        └─── mode=1 ───→ GreetingPlain ───→ StartTlsUpgrade ───→ HandshakeSecure
//!                                                                         │
//!        ┌────────────────────────────────────────────────────────────────┘
//!        └──→ [Authenticating] ───→ Envelope ───→ DataTransfer ───→ Closing
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP commands and accepted reply ranges
//! - [`config`]: Session configuration and option parsing
//! - [`connection`]: Transport, channel and command sequencing
//! - [`parser`]: Reply parser
//! - [`session`]: The submission state machine
//! - [`tls`]: TLS handshake and certificate verification
//! - [`types`]: Core SMTP types (addresses, replies, messages)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod tls;
pub mod types;

pub use auth::auth_login;
pub use command::{Command, ReplyRange};
pub use config::{Config, ConfigBuilder, Mode, VerifyMode};
pub use connection::{Channel, Connection};
pub use error::{Error, Result};
pub use session::{Delivery, Phase, Session, SessionError, send_mail};
pub use tls::{
    CredentialProvider, PemFiles, RustlsUpgrade, SecureChannel, TlsUpgrade,
    available_cipher_suites,
};
pub use types::{Address, Credentials, Message, Reply, ReplyCode, VerificationResult};
