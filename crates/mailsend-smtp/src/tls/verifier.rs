//! Certificate verifier that records findings instead of aborting.

use std::sync::{Arc, Mutex, PoisonError};

use rustls::RootCertStore;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tracing::debug;

use crate::types::VerificationResult;

/// Wraps the WebPKI verifier and turns certificate errors into
/// [`VerificationResult`] flags.
///
/// The handshake always proceeds past certificate problems; whether the
/// findings are fatal is decided by the session. Signature checks are still
/// enforced, so the peer must hold the key of the certificate it presents.
///
/// `roots` and `algorithms` must be the ones `inner` was built with; they are
/// used to walk the chain again when a validity failure cut the first walk
/// short.
#[derive(Debug)]
pub struct AdvisoryVerifier {
    inner: Arc<WebPkiServerVerifier>,
    roots: Arc<RootCertStore>,
    algorithms: WebPkiSupportedAlgorithms,
    findings: Mutex<VerificationResult>,
}

impl AdvisoryVerifier {
    /// Creates a verifier around a configured WebPKI verifier.
    #[must_use]
    pub const fn new(
        inner: Arc<WebPkiServerVerifier>,
        roots: Arc<RootCertStore>,
        algorithms: WebPkiSupportedAlgorithms,
    ) -> Self {
        Self {
            inner,
            roots,
            algorithms,
            findings: Mutex::new(VerificationResult::empty()),
        }
    }

    /// Returns and clears the findings of the last handshake.
    pub fn take_findings(&self) -> VerificationResult {
        std::mem::take(&mut *self.findings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record(&self, result: VerificationResult) {
        *self.findings.lock().unwrap_or_else(PoisonError::into_inner) = result;
    }

    /// Walks the chain to a trust anchor as of `when`.
    fn chain_findings_at(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        when: UnixTime,
    ) -> VerificationResult {
        let outcome = ParsedCertificate::try_from(end_entity).and_then(|cert| {
            rustls::client::verify_server_cert_signed_by_trust_anchor(
                &cert,
                &self.roots,
                intermediates,
                when,
                self.algorithms.all,
            )
        });
        match outcome {
            Ok(()) => VerificationResult::empty(),
            Err(rustls::Error::InvalidCertificate(error)) => classify(&error),
            Err(_) => VerificationResult::UNTRUSTED,
        }
    }
}

/// Returns a time inside the validity window that `error` reports, if any.
fn validity_bound(error: &CertificateError) -> Option<UnixTime> {
    match error {
        CertificateError::ExpiredContext { not_after, .. } => Some(*not_after),
        CertificateError::NotValidYetContext { not_before, .. } => Some(*not_before),
        _ => None,
    }
}

/// Maps a WebPKI certificate error to a finding.
fn classify(error: &CertificateError) -> VerificationResult {
    match error {
        CertificateError::Expired
        | CertificateError::ExpiredContext { .. }
        | CertificateError::NotValidYet
        | CertificateError::NotValidYetContext { .. } => VerificationResult::EXPIRED,
        CertificateError::Revoked => VerificationResult::REVOKED,
        CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
            VerificationResult::HOSTNAME_MISMATCH
        }
        _ => VerificationResult::UNTRUSTED,
    }
}

impl ServerCertVerifier for AdvisoryVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let outcome = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );

        let findings = match outcome {
            Ok(_) => VerificationResult::empty(),
            Err(rustls::Error::InvalidCertificate(error)) => {
                debug!("certificate verification failed: {error:?}");
                let mut findings = classify(&error);
                // A validity failure stops the walk before the issuer is
                // looked up, so trust is checked again inside the window.
                if let Some(when) = validity_bound(&error) {
                    findings |= self.chain_findings_at(end_entity, intermediates, when);
                }
                // The chain is checked before the name, so a chain failure
                // hides a name mismatch unless it is checked separately.
                if !findings.contains(VerificationResult::HOSTNAME_MISMATCH) {
                    let name_ok = ParsedCertificate::try_from(end_entity)
                        .and_then(|cert| rustls::client::verify_server_name(&cert, server_name));
                    if name_ok.is_err() {
                        findings |= VerificationResult::HOSTNAME_MISMATCH;
                    }
                }
                findings
            }
            Err(other) => return Err(other),
        };

        self.record(findings);
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn classifies_certificate_errors() {
        assert_eq!(
            classify(&CertificateError::Expired),
            VerificationResult::EXPIRED
        );
        assert_eq!(
            classify(&CertificateError::NotValidYet),
            VerificationResult::EXPIRED
        );
        assert_eq!(
            classify(&CertificateError::Revoked),
            VerificationResult::REVOKED
        );
        assert_eq!(
            classify(&CertificateError::NotValidForName),
            VerificationResult::HOSTNAME_MISMATCH
        );
        assert_eq!(
            classify(&CertificateError::UnknownIssuer),
            VerificationResult::UNTRUSTED
        );
        assert_eq!(
            classify(&CertificateError::BadSignature),
            VerificationResult::UNTRUSTED
        );
    }

    #[test]
    fn validity_bound_points_inside_the_window() {
        let not_after = UnixTime::since_unix_epoch(std::time::Duration::from_secs(978_307_200));
        let later = UnixTime::since_unix_epoch(std::time::Duration::from_secs(1_700_000_000));
        let expired = CertificateError::ExpiredContext {
            time: later,
            not_after,
        };
        assert_eq!(validity_bound(&expired), Some(not_after));

        let not_yet = CertificateError::NotValidYetContext {
            time: not_after,
            not_before: later,
        };
        assert_eq!(validity_bound(&not_yet), Some(later));

        assert_eq!(validity_bound(&CertificateError::Expired), None);
        assert_eq!(validity_bound(&CertificateError::UnknownIssuer), None);
    }
}
