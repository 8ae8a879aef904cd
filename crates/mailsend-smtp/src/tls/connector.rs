//! rustls-backed [`TlsUpgrade`].

use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, SupportedCipherSuite};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info};

use super::{AdvisoryVerifier, CredentialProvider, SecureChannel, TlsUpgrade};
use crate::config::Config;
use crate::error::{Error, Result};

fn suite_name(suite: SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Lists the cipher suites `force_ciphersuite` accepts.
#[must_use]
pub fn available_cipher_suites() -> Vec<String> {
    rustls::crypto::aws_lc_rs::default_provider()
        .cipher_suites
        .into_iter()
        .map(suite_name)
        .collect()
}

/// Builds the crypto provider, restricted to one suite if requested.
fn crypto_provider(force_ciphersuite: Option<&str>) -> Result<CryptoProvider> {
    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Some(wanted) = force_ciphersuite {
        provider
            .cipher_suites
            .retain(|suite| suite_name(*suite).eq_ignore_ascii_case(wanted));
        if provider.cipher_suites.is_empty() {
            return Err(Error::Config(format!("unknown ciphersuite: {wanted}")));
        }
    }
    Ok(provider)
}

/// TLS client built from the configuration and a [`CredentialProvider`].
///
/// One instance serves the single handshake of a session, either right after
/// connecting or after `STARTTLS`.
#[derive(Clone)]
pub struct RustlsUpgrade {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    verifier: Arc<AdvisoryVerifier>,
}

impl std::fmt::Debug for RustlsUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsUpgrade")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl RustlsUpgrade {
    /// Builds the TLS client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the server name is invalid, the forced cipher
    /// suite is unknown, or certificate material cannot be provisioned.
    pub fn new(config: &Config, credentials: &dyn CredentialProvider) -> Result<Self> {
        let server_name = ServerName::try_from(config.server_name.clone())
            .map_err(|_| Error::Config(format!("Invalid hostname: {}", config.server_name)))?;

        let provider = Arc::new(crypto_provider(config.force_ciphersuite.as_deref())?);
        let roots = Arc::new(credentials.trust_anchors()?);
        let webpki = WebPkiServerVerifier::builder_with_provider(roots.clone(), provider.clone())
            .build()
            .map_err(|e| Error::Certificate(e.to_string()))?;
        let verifier = Arc::new(AdvisoryVerifier::new(
            webpki,
            roots,
            provider.signature_verification_algorithms,
        ));

        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier.clone());

        let tls_config = match credentials.client_identity()? {
            Some(identity) => builder.with_client_auth_cert(identity.chain, identity.key)?,
            None => builder.with_no_client_auth(),
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name,
            verifier,
        })
    }
}

impl<S> TlsUpgrade<S> for RustlsUpgrade
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Stream = TlsStream<S>;

    async fn handshake(&self, stream: S) -> Result<SecureChannel<Self::Stream>> {
        info!("Performing the TLS handshake");
        let tls = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(Error::Handshake)?;

        let (_, session) = tls.get_ref();
        let cipher_suite = session
            .negotiated_cipher_suite()
            .map_or_else(|| "unknown".to_string(), suite_name);
        let protocol = session
            .protocol_version()
            .map(|version| format!("{version:?}"));
        if let Some(chain) = session.peer_certificates() {
            debug!(
                "peer presented {} certificate(s), leaf {} bytes",
                chain.len(),
                chain.first().map_or(0, |cert| cert.len())
            );
        }

        let mut channel = SecureChannel::new(tls, cipher_suite, self.verifier.take_findings());
        if let Some(protocol) = protocol {
            channel = channel.with_protocol(protocol);
        }
        Ok(channel)
    }
}
