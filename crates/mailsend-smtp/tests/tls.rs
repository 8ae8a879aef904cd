//! Integration tests for the rustls upgrade.
//!
//! A rustls server runs on the other end of an in-memory duplex pipe with
//! certificates generated by rcgen.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_rustls::TlsAcceptor;

use mailsend_smtp::{
    Config, Message, PemFiles, ReplyCode, RustlsUpgrade, Session, TlsUpgrade, VerificationResult,
};

/// A throwaway CA and a server certificate it issued.
struct TestPki {
    ca_pem: String,
    chain: Vec<CertificateDer<'static>>,
    key_der: Vec<u8>,
}

/// A server certificate that expired on 2001-01-01.
fn expired_leaf_params(server_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![server_name.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, server_name);
    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2001, 1, 1);
    params
}

impl TestPki {
    fn new(server_name: &str) -> Self {
        let mut leaf_params = CertificateParams::new(vec![server_name.to_string()]).unwrap();
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, server_name);
        Self::issued(leaf_params)
    }

    /// A CA and a leaf it issued from `leaf_params`.
    fn issued(leaf_params: CertificateParams) -> Self {
        let mut ca_params = CertificateParams::new(Vec::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "mailsend test CA");
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let leaf = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        Self {
            ca_pem: ca_cert.pem(),
            chain: vec![leaf.der().clone()],
            key_der: leaf_key.serialize_der(),
        }
    }

    /// A self-signed leaf; `ca_pem` is the leaf itself.
    fn self_signed(params: CertificateParams) -> Self {
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self {
            ca_pem: cert.pem(),
            chain: vec![cert.der().clone()],
            key_der: key.serialize_der(),
        }
    }

    fn acceptor(&self) -> TlsAcceptor {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()));
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(self.chain.clone(), key)
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }

    fn write_ca(&self, name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mailsend-{}-{name}.pem", std::process::id()));
        std::fs::write(&path, &self.ca_pem).unwrap();
        path
    }
}

fn config(options: &[&str]) -> Config {
    let base = ["mail_from=alice@example.com", "mail_to=bob@example.com"];
    Config::from_options(base.iter().chain(options)).unwrap()
}

/// Runs one handshake and returns the client's findings.
async fn handshake(pki: &TestPki, config: &Config) -> (VerificationResult, String) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let upgrade = RustlsUpgrade::new(config, &PemFiles::from_config(config)).unwrap();
    let acceptor = pki.acceptor();

    let (client, server) = tokio::join!(upgrade.handshake(client_io), acceptor.accept(server_io));
    server.unwrap();
    let channel = client.unwrap();
    (channel.verify(), channel.cipher_suite().to_string())
}

#[tokio::test]
async fn test_unknown_issuer_is_reported_not_fatal() {
    let pki = TestPki::new("mail.example.com");
    let config = config(&["server_name=mail.example.com"]);

    let (findings, cipher_suite) = handshake(&pki, &config).await;
    assert_eq!(findings, VerificationResult::UNTRUSTED);
    assert!(cipher_suite.starts_with("TLS13_"));
}

#[tokio::test]
async fn test_name_mismatch_is_reported_alongside_untrusted() {
    let pki = TestPki::new("mail.example.com");
    let config = config(&["server_name=other.example.org"]);

    let (findings, _) = handshake(&pki, &config).await;
    assert_eq!(
        findings,
        VerificationResult::UNTRUSTED | VerificationResult::HOSTNAME_MISMATCH
    );
    assert_eq!(findings.findings("other.example.org").len(), 2);
}

#[tokio::test]
async fn test_configured_ca_verifies() {
    let pki = TestPki::new("mail.example.com");
    let ca_file = pki.write_ca("verifies");
    let ca_option = format!("ca_file={}", ca_file.display());
    let config = config(&["server_name=mail.example.com", &ca_option]);

    let (findings, _) = handshake(&pki, &config).await;
    assert!(findings.is_verified());

    std::fs::remove_file(ca_file).ok();
}

#[tokio::test]
async fn test_forced_ciphersuite_is_negotiated() {
    let pki = TestPki::new("mail.example.com");
    let config = config(&[
        "server_name=mail.example.com",
        "force_ciphersuite=TLS13_CHACHA20_POLY1305_SHA256",
    ]);

    let (_, cipher_suite) = handshake(&pki, &config).await;
    assert_eq!(cipher_suite, "TLS13_CHACHA20_POLY1305_SHA256");
}

#[tokio::test]
async fn test_expired_self_signed_is_also_untrusted() {
    let pki = TestPki::self_signed(expired_leaf_params("mail.example.com"));
    let config = config(&["server_name=mail.example.com"]);

    let (findings, _) = handshake(&pki, &config).await;
    assert_eq!(
        findings,
        VerificationResult::EXPIRED | VerificationResult::UNTRUSTED
    );
    assert_eq!(findings.findings("mail.example.com").len(), 2);
}

#[tokio::test]
async fn test_expired_leaf_from_trusted_ca_is_only_expired() {
    let pki = TestPki::issued(expired_leaf_params("mail.example.com"));
    let ca_file = pki.write_ca("expired");
    let ca_option = format!("ca_file={}", ca_file.display());
    let config = config(&["server_name=mail.example.com", &ca_option]);

    let (findings, _) = handshake(&pki, &config).await;
    assert_eq!(findings, VerificationResult::EXPIRED);

    std::fs::remove_file(ca_file).ok();
}

#[tokio::test]
async fn test_expired_leaf_with_wrong_name_reports_everything() {
    let pki = TestPki::self_signed(expired_leaf_params("mail.example.com"));
    let config = config(&["server_name=other.example.org"]);

    let (findings, _) = handshake(&pki, &config).await;
    assert_eq!(
        findings,
        VerificationResult::EXPIRED
            | VerificationResult::UNTRUSTED
            | VerificationResult::HOSTNAME_MISMATCH
    );
}

/// Minimal implicit-TLS submission server; returns what it received.
async fn serve(acceptor: TlsAcceptor, io: DuplexStream) -> Vec<String> {
    let tls = acceptor.accept(io).await.unwrap();
    let mut tls = BufReader::new(tls);
    let mut received = Vec::new();

    tls.write_all(b"220 mail.example.com ESMTP\r\n").await.unwrap();
    tls.flush().await.unwrap();

    let mut in_data = false;
    loop {
        let mut line = String::new();
        if tls.read_line(&mut line).await.unwrap() == 0 {
            break;
        }
        received.push(line.clone());

        let reply: &[u8] = if in_data {
            if line != ".\r\n" {
                continue;
            }
            in_data = false;
            b"250 2.0.0 Queued\r\n"
        } else if line.starts_with("EHLO") {
            b"250-mail.example.com\r\n250 SIZE 10240000\r\n"
        } else if line.starts_with("DATA") {
            in_data = true;
            b"354 End data with <CR><LF>.<CR><LF>\r\n"
        } else {
            b"250 OK\r\n"
        };
        tls.write_all(reply).await.unwrap();
        tls.flush().await.unwrap();
    }

    // The client closed with a TLS close notification.
    let mut rest = Vec::new();
    tls.read_to_end(&mut rest).await.ok();
    received
}

#[tokio::test]
async fn test_implicit_tls_delivery_end_to_end() {
    let pki = TestPki::new("mail.example.com");
    let config = config(&[
        "server_name=mail.example.com",
        "ehlo_name=client.example.com",
        "subject=End to end",
    ]);
    let message = Message::compose(&config).unwrap();

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let upgrade = RustlsUpgrade::new(&config, &PemFiles::from_config(&config)).unwrap();
    let session = Session::new(&config, client_io, upgrade);

    let (delivery, received) = tokio::join!(
        session.deliver(&message),
        serve(pki.acceptor(), server_io)
    );

    let delivery = delivery.unwrap();
    assert_eq!(delivery.reply.code, ReplyCode::OK);
    assert_eq!(delivery.verification, VerificationResult::UNTRUSTED);

    assert_eq!(received[0], "EHLO client.example.com\r\n");
    assert_eq!(received[1], "MAIL FROM:<alice@example.com>\r\n");
    assert_eq!(received[2], "RCPT TO:<bob@example.com>\r\n");
    assert_eq!(received[3], "DATA\r\n");
    assert!(received.contains(&"Subject: End to end\r\n".to_string()));
    assert_eq!(received.last().map(String::as_str), Some(".\r\n"));
}
