//! Provisioning of trust anchors and the client certificate.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

/// Client certificate chain and its private key.
#[derive(Debug)]
pub struct ClientIdentity {
    /// Certificate chain, leaf first.
    pub chain: Vec<CertificateDer<'static>>,
    /// Private key matching the leaf.
    pub key: PrivateKeyDer<'static>,
}

/// Supplies certificate material to the TLS layer.
pub trait CredentialProvider {
    /// Trust anchors used to verify the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the anchors cannot be loaded.
    fn trust_anchors(&self) -> Result<RootCertStore>;

    /// Client certificate and key, if client authentication is wanted.
    ///
    /// # Errors
    ///
    /// Returns an error if configured material cannot be loaded.
    fn client_identity(&self) -> Result<Option<ClientIdentity>>;
}

/// Loads PEM files named in the configuration.
///
/// Without a CA file the `webpki-roots` anchors are used. The client
/// certificate and key must be given together.
#[derive(Debug, Clone, Default)]
pub struct PemFiles {
    ca_file: Option<PathBuf>,
    crt_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
}

impl PemFiles {
    /// Creates a provider from explicit paths.
    #[must_use]
    pub const fn new(
        ca_file: Option<PathBuf>,
        crt_file: Option<PathBuf>,
        key_file: Option<PathBuf>,
    ) -> Self {
        Self {
            ca_file,
            crt_file,
            key_file,
        }
    }

    /// Creates a provider from the `ca_file`, `crt_file` and `key_file`
    /// options.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ca_file.clone(),
            config.crt_file.clone(),
            config.key_file.clone(),
        )
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::Certificate(format!("{}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Certificate(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Certificate(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| Error::Certificate(format!("{}: {e}", path.display())))?
        .ok_or_else(|| Error::Certificate(format!("{}: no private key found", path.display())))
}

impl CredentialProvider for PemFiles {
    fn trust_anchors(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        match &self.ca_file {
            Some(path) => {
                info!("Loading the CA root certificates from {}", path.display());
                let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
                debug!("{added} trust anchors loaded, {ignored} ignored");
                if added == 0 {
                    return Err(Error::Certificate(format!(
                        "{}: no usable CA certificates",
                        path.display()
                    )));
                }
            }
            None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        }
        Ok(roots)
    }

    fn client_identity(&self) -> Result<Option<ClientIdentity>> {
        match (&self.crt_file, &self.key_file) {
            (None, None) => Ok(None),
            (Some(crt), Some(key)) => {
                info!("Loading the client certificate and key");
                Ok(Some(ClientIdentity {
                    chain: load_certs(crt)?,
                    key: load_key(key)?,
                }))
            }
            (Some(_), None) => Err(Error::Certificate(
                "crt_file given without key_file".into(),
            )),
            (None, Some(_)) => Err(Error::Certificate(
                "key_file given without crt_file".into(),
            )),
        }
    }
}
