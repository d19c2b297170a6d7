//! CA trust store for the broker TLS connection
//!
//! The subscriber trusts exactly the certificates found in one PEM file. No
//! system roots are consulted and no client certificate is presented.
//!
//! rustls types come through `rumqttc::tokio_rustls` so they always match the
//! version rumqttc was built against.

use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use rumqttc::{TlsConfiguration, Transport};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while building the trust store
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("failed to read CA certificate '{}': {}", path.display(), source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse PEM in '{}': {}", path.display(), source)]
    Parse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no usable CA certificate found in '{}'", path.display())]
    NoCertificates { path: PathBuf },
}

/// Root certificates accepted for the broker's server certificate
#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
    source: PathBuf,
    certificate_count: usize,
}

/// Read `path` and build a trust store from every PEM certificate in it.
///
/// A file that yields no usable certificate is an error rather than an
/// empty store.
pub fn build_trust(path: &Path) -> Result<TrustStore, TrustError> {
    let pem = std::fs::read(path).map_err(|source| TrustError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    TrustStore::from_pem(&pem, path)
}

impl TrustStore {
    /// Build a trust store from PEM bytes; `source` is only used for messages
    pub fn from_pem(pem: &[u8], source: &Path) -> Result<Self, TrustError> {
        let mut reader = BufReader::new(pem);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrustError::Parse {
                path: source.to_path_buf(),
                source: e,
            })?;

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);
        if ignored > 0 {
            warn!(
                path = %source.display(),
                ignored,
                "Skipped CA certificates that could not be parsed"
            );
        }
        if added == 0 {
            return Err(TrustError::NoCertificates {
                path: source.to_path_buf(),
            });
        }

        debug!(path = %source.display(), certificates = added, "Loaded CA trust store");

        Ok(Self {
            roots: Arc::new(roots),
            source: source.to_path_buf(),
            certificate_count: added,
        })
    }

    pub fn certificate_count(&self) -> usize {
        self.certificate_count
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }

    /// rustls client configuration trusting only this store, without client auth
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .with_root_certificates(self.roots.clone())
            .with_no_client_auth()
    }

    /// rumqttc transport using [`TrustStore::client_config`]
    pub fn transport(&self) -> Transport {
        Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(self.client_config())))
    }
}
