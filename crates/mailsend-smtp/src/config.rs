//! Session configuration.
//!
//! A [`Config`] is built once, either with [`ConfigBuilder`] or from the
//! `key=value` options accepted on the command line, and is only read
//! afterwards.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::parser::ParserLimits;
use crate::types::{Address, Credentials};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// TLS from the start (port 465).
    #[default]
    ImplicitTls,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    StartTls,
}

impl Mode {
    /// Returns the default port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::ImplicitTls => 465,
            Self::StartTls => 587,
        }
    }
}

/// What to do when the server certificate does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Report findings as warnings and continue.
    #[default]
    Optional,
    /// Abort the session on any finding.
    Required,
}

/// Default subject of the composed message.
pub const DEFAULT_SUBJECT: &str = "mailsend test mail";

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, also used for SNI and certificate checks.
    pub server_name: String,
    /// Server port.
    pub server_port: u16,
    /// Security mode.
    pub mode: Mode,
    /// Diagnostic verbosity.
    pub debug_level: u16,
    /// Credentials; `Some` enables `AUTH LOGIN`.
    pub credentials: Option<Credentials>,
    /// Envelope sender.
    pub mail_from: Address,
    /// Envelope recipient.
    pub mail_to: Address,
    /// PEM file with trust anchors.
    pub ca_file: Option<PathBuf>,
    /// PEM file with the client certificate chain.
    pub crt_file: Option<PathBuf>,
    /// PEM file with the client private key.
    pub key_file: Option<PathBuf>,
    /// Restrict the handshake to this cipher suite.
    pub force_ciphersuite: Option<String>,
    /// Certificate verification policy.
    pub verify: VerifyMode,
    /// Name sent with `EHLO`; the system hostname when unset.
    pub ehlo_name: Option<String>,
    /// Message subject.
    pub subject: String,
    /// File holding the message body.
    pub body_file: Option<PathBuf>,
    /// Connection timeout; unbounded when unset.
    pub connect_timeout: Option<Duration>,
    /// Per-operation read/write/handshake timeout; unbounded when unset.
    pub io_timeout: Option<Duration>,
    /// Reply parser buffer limits.
    pub limits: ParserLimits,
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parses `key=value` options.
    ///
    /// Keys are case-insensitive. Recognised keys: `server_name`,
    /// `server_port`, `debug_level`, `authentication`, `mode`, `user_name`,
    /// `user_pwd`, `mail_from`, `mail_to`, `ca_file`, `crt_file`,
    /// `key_file`, `force_ciphersuite`, `verify`, `ehlo_name`, `subject`,
    /// `body_file`, `connect_timeout`, `io_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown keys, malformed pairs,
    /// out-of-range numbers or missing required options.
    pub fn from_options<I, S>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = ConfigBuilder::new();
        for option in options {
            let option = option.as_ref();
            let Some((key, value)) = option.split_once('=') else {
                return Err(Error::Config(format!("expected key=value, got {option:?}")));
            };
            builder = builder.set(&key.to_ascii_lowercase(), value)?;
        }
        builder.build()
    }

    /// Returns the name to send with `EHLO`.
    #[must_use]
    pub fn local_hostname(&self) -> String {
        self.ehlo_name.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "localhost".to_string())
        })
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    server_name: String,
    server_port: Option<u16>,
    mode: Mode,
    debug_level: u16,
    authentication: bool,
    user_name: Option<String>,
    user_pwd: Option<String>,
    mail_from: Option<String>,
    mail_to: Option<String>,
    ca_file: Option<PathBuf>,
    crt_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    force_ciphersuite: Option<String>,
    verify: VerifyMode,
    ehlo_name: Option<String>,
    subject: String,
    body_file: Option<PathBuf>,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    limits: ParserLimits,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T>(key: &str, value: &str, range: std::ops::RangeInclusive<T>) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|n| range.contains(n))
        .ok_or_else(|| {
            Error::Config(format!(
                "{key} must be a number between {} and {}, got {value:?}",
                range.start(),
                range.end()
            ))
        })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Rejects values that would end or split a command or header line.
fn check_line(key: &str, value: &str, allow_space: bool) -> Result<()> {
    let bad = value
        .chars()
        .any(|c| c.is_control() || (!allow_space && c.is_whitespace()));
    if bad {
        return Err(Error::Config(format!(
            "{key} must be a single line without control characters, got {value:?}"
        )));
    }
    Ok(())
}

impl ConfigBuilder {
    /// Creates a builder with every option at its default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            server_name: "localhost".to_string(),
            server_port: None,
            mode: Mode::ImplicitTls,
            debug_level: 0,
            authentication: false,
            user_name: None,
            user_pwd: None,
            mail_from: None,
            mail_to: None,
            ca_file: None,
            crt_file: None,
            key_file: None,
            force_ciphersuite: None,
            verify: VerifyMode::Optional,
            ehlo_name: None,
            subject: DEFAULT_SUBJECT.to_string(),
            body_file: None,
            connect_timeout: None,
            io_timeout: None,
            limits: ParserLimits::default(),
        }
    }

    /// Applies one option by key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown keys or invalid values.
    pub fn set(mut self, key: &str, value: &str) -> Result<Self> {
        match key {
            "server_name" => self.server_name = value.to_string(),
            "server_port" => self.server_port = Some(parse_number(key, value, 1..=65535)?),
            "debug_level" => self.debug_level = parse_number(key, value, 0..=65535)?,
            "authentication" => self.authentication = parse_number(key, value, 0u8..=1)? == 1,
            "mode" => {
                self.mode = match parse_number(key, value, 0u8..=1)? {
                    0 => Mode::ImplicitTls,
                    _ => Mode::StartTls,
                };
            }
            "user_name" => self.user_name = Some(value.to_string()),
            "user_pwd" => self.user_pwd = Some(value.to_string()),
            "mail_from" => self.mail_from = non_empty(value),
            "mail_to" => self.mail_to = non_empty(value),
            "ca_file" => self.ca_file = non_empty(value).map(PathBuf::from),
            "crt_file" => self.crt_file = non_empty(value).map(PathBuf::from),
            "key_file" => self.key_file = non_empty(value).map(PathBuf::from),
            "force_ciphersuite" => self.force_ciphersuite = non_empty(value),
            "verify" => {
                self.verify = match value.to_ascii_lowercase().as_str() {
                    "optional" | "0" => VerifyMode::Optional,
                    "required" | "1" => VerifyMode::Required,
                    _ => {
                        return Err(Error::Config(format!(
                            "verify must be optional or required, got {value:?}"
                        )));
                    }
                };
            }
            "ehlo_name" => self.ehlo_name = non_empty(value),
            "subject" => self.subject = value.to_string(),
            "body_file" => self.body_file = non_empty(value).map(PathBuf::from),
            "connect_timeout" => {
                self.connect_timeout = Some(Duration::from_secs(parse_number(key, value, 1..=86_400)?));
            }
            "io_timeout" => {
                self.io_timeout = Some(Duration::from_secs(parse_number(key, value, 1..=86_400)?));
            }
            _ => return Err(Error::Config(format!("unknown option: {key}"))),
        }
        Ok(self)
    }

    /// Sets the server hostname.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables `AUTH LOGIN` with the given credentials.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.authentication = true;
        self.user_name = Some(user.into());
        self.user_pwd = Some(password.into());
        self
    }

    /// Sets the envelope sender and recipient.
    #[must_use]
    pub fn envelope(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.mail_from = Some(from.into());
        self.mail_to = Some(to.into());
        self
    }

    /// Sets the name sent with `EHLO`.
    #[must_use]
    pub fn ehlo_name(mut self, name: impl Into<String>) -> Self {
        self.ehlo_name = Some(name.into());
        self
    }

    /// Sets the certificate verification policy.
    #[must_use]
    pub const fn verify(mut self, verify: VerifyMode) -> Self {
        self.verify = verify;
        self
    }

    /// Sets the per-operation I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Sets the reply parser limits.
    #[must_use]
    pub const fn limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an envelope address is missing or invalid, if
    /// authentication is enabled without both credentials, or if `ehlo_name`
    /// or `subject` contains line breaks or other control characters.
    pub fn build(self) -> Result<Config> {
        if let Some(name) = &self.ehlo_name {
            check_line("ehlo_name", name, false)?;
        }
        check_line("subject", &self.subject, true)?;

        let mail_from = self
            .mail_from
            .ok_or_else(|| Error::Config("mail_from is required".into()))?;
        let mail_to = self
            .mail_to
            .ok_or_else(|| Error::Config("mail_to is required".into()))?;

        let credentials = if self.authentication {
            match (self.user_name, self.user_pwd) {
                (Some(user), Some(pwd)) => Some(Credentials::new(user, pwd)),
                _ => {
                    return Err(Error::Config(
                        "authentication=1 requires user_name and user_pwd".into(),
                    ));
                }
            }
        } else {
            None
        };

        Ok(Config {
            server_name: self.server_name,
            server_port: self.server_port.unwrap_or_else(|| self.mode.default_port()),
            mode: self.mode,
            debug_level: self.debug_level,
            credentials,
            mail_from: Address::new(mail_from)?,
            mail_to: Address::new(mail_to)?,
            ca_file: self.ca_file,
            crt_file: self.crt_file,
            key_file: self.key_file,
            force_ciphersuite: self.force_ciphersuite,
            verify: self.verify,
            ehlo_name: self.ehlo_name,
            subject: self.subject,
            body_file: self.body_file,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            limits: self.limits,
        })
    }
}
