//! Trust store behavior against real certificate chains
//!
//! Verification runs at a fixed time inside the fixtures' validity window so
//! the outcome does not depend on the machine clock.

use mqtt_tls_subscriber::transport::mqtt::{build_trust, TrustError, TrustStore};
use rumqttc::tokio_rustls::rustls::client::danger::ServerCertVerifier;
use rumqttc::tokio_rustls::rustls::client::WebPkiServerVerifier;
use rumqttc::tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

const CA_PEM: &[u8] = include_bytes!("fixtures/ca.pem");
const OTHER_CA_PEM: &[u8] = include_bytes!("fixtures/other_ca.pem");
const BROKER_PEM: &[u8] = include_bytes!("fixtures/broker.pem");

/// 2030-01-01T00:00:00Z
fn verification_time() -> UnixTime {
    UnixTime::since_unix_epoch(Duration::from_secs(1_893_456_000))
}

fn broker_certificate() -> CertificateDer<'static> {
    rustls_pemfile::certs(&mut BufReader::new(BROKER_PEM))
        .next()
        .unwrap()
        .unwrap()
}

fn verify(store: &TrustStore, host: &str) -> Result<(), String> {
    let verifier = WebPkiServerVerifier::builder(store.roots())
        .build()
        .map_err(|e| e.to_string())?;
    let server_name = ServerName::try_from(host).map_err(|e| e.to_string())?;

    verifier
        .verify_server_cert(
            &broker_certificate(),
            &[],
            &server_name,
            &[],
            verification_time(),
        )
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[test]
fn test_chain_rooted_at_configured_ca_is_accepted() {
    let store = TrustStore::from_pem(CA_PEM, Path::new("ca.pem")).unwrap();
    assert_eq!(verify(&store, "broker.example.com"), Ok(()));
}

#[test]
fn test_chain_from_unrelated_ca_is_rejected() {
    let store = TrustStore::from_pem(OTHER_CA_PEM, Path::new("other_ca.pem")).unwrap();
    assert!(verify(&store, "broker.example.com").is_err());
}

#[test]
fn test_host_name_mismatch_is_rejected() {
    let store = TrustStore::from_pem(CA_PEM, Path::new("ca.pem")).unwrap();
    assert!(verify(&store, "other.example.com").is_err());
}

#[test]
fn test_bundle_trusts_every_member() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(OTHER_CA_PEM).unwrap();
    file.write_all(CA_PEM).unwrap();

    let store = build_trust(file.path()).unwrap();
    assert_eq!(store.certificate_count(), 2);
    assert_eq!(verify(&store, "broker.example.com"), Ok(()));
}

#[test]
fn test_malformed_file_is_fatal() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"this is not a certificate\n").unwrap();

    let result = build_trust(file.path());
    assert!(matches!(result, Err(TrustError::NoCertificates { .. })));
}

#[test]
fn test_client_config_has_no_client_auth() {
    let store = TrustStore::from_pem(CA_PEM, Path::new("ca.pem")).unwrap();
    let config = store.client_config();
    assert!(!config.client_auth_cert_resolver.has_certs());
}
