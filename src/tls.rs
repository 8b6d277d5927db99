//! Certificate validation and TLS server configuration.
//!
//! A TLS fixture must never start with an unvalidated certificate: the
//! PEM file is loaded into a `rustls::ServerConfig` (TLS 1.2 floor,
//! TLS 1.3 ceiling) at server construction and that same validated config
//! is what the TLS-terminating handler is built from.

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::FixtureError;

/// A certificate file that was successfully loaded by the TLS stack.
pub struct ValidatedCert {
    pub path: std::path::PathBuf,
    pub server_config: std::sync::Arc<rustls::ServerConfig>,
}

impl std::fmt::Debug for ValidatedCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedCert")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

pub fn install_crypto_provider() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // ignore if already installed
}

fn invalid(path: &std::path::Path, reason: impl std::fmt::Display) -> FixtureError {
    FixtureError::InvalidCertificate {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Loads a PEM file holding a certificate chain and its private key and
/// builds a server config restricted to TLS 1.2-1.3 from it.
pub fn validate_cert_file(path: &std::path::Path) -> Result<ValidatedCert, FixtureError> {
    install_crypto_provider();
    let path = std::path::absolute(path).map_err(|error| invalid(path, error))?;
    let certs = CertificateDer::pem_file_iter(&path)
        .map_err(|error| invalid(&path, &error))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| invalid(&path, &error))?;
    if certs.is_empty() {
        return Err(invalid(&path, "no certificate found in file"));
    }
    let key = PrivateKeyDer::from_pem_file(&path).map_err(|error| invalid(&path, &error))?;
    let config = rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ])
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|error| invalid(&path, &error))?;
    Ok(ValidatedCert {
        path,
        server_config: std::sync::Arc::new(config),
    })
}

/// Generates the default self-signed certificate used when the consumer
/// configured none, writing key + certificate PEM into `dir`.
///
/// The key is Ed25519; the certificate is ephemeral and only ever trusted
/// by test clients that opt into it.
pub fn write_default_cert(dir: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519)?;
    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()])?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "local-ftp-fixture".to_string());
    let cert = params.self_signed(&key_pair)?;
    let pem_path = dir.join("default_keycert.pem");
    let pem = format!("{}{}", key_pair.serialize_pem(), cert.pem());
    std::fs::write(&pem_path, pem)?;
    Ok(pem_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_default_cert_validates() {
        let dir = std::env::temp_dir().join(format!("cert_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let pem_path = write_default_cert(&dir).unwrap();
        let validated = validate_cert_file(&pem_path).unwrap();
        assert!(validated.path.is_absolute());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn garbage_file_is_rejected_with_path_and_reason() {
        let dir = std::env::temp_dir().join(format!("cert_garbage_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let pem_path = dir.join("bogus.pem");
        std::fs::write(&pem_path, "this is not a certificate").unwrap();
        let error = validate_cert_file(&pem_path).unwrap_err();
        match &error {
            FixtureError::InvalidCertificate { path, .. } => {
                assert!(path.ends_with("bogus.pem"));
            }
            other => panic!("expected InvalidCertificate, got: {other:?}"),
        }
        assert!(error.to_string().contains("bogus.pem"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_rejected() {
        let missing = std::path::Path::new("/definitely/not/there.pem");
        assert!(matches!(
            validate_cert_file(missing),
            Err(FixtureError::InvalidCertificate { .. })
        ));
    }
}
