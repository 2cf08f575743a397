//! rustls client configuration for the TCP fallback path
//!
//! The gateway authenticates clients by mTLS, so the client certificate
//! and key are mandatory. Trust anchors come from the configured CA
//! bundle when one is given, otherwise from Mozilla's root program via
//! `webpki-roots`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use super::TransportError;
use crate::tunnel::TlsSettings;

/// Build a rustls client config with the tunnel's client certificate and
/// the given ALPN protocols.
pub(crate) fn build_client_config(
    tls: &TlsSettings,
    alpn: &[&str],
) -> Result<Arc<ClientConfig>, TransportError> {
    let certs = load_certs(&tls.cert_path)?;
    let key = load_key(&tls.key_path)?;
    let roots = build_root_store(tls.ca_path.as_deref())?;

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| TransportError::Tls(format!("invalid client certificate: {e}")))?;

    config.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

    Ok(Arc::new(config))
}

/// Load a PEM certificate chain.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Tls(format!("failed to open certificate {}: {e}", path.display()))
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|e| {
            TransportError::Tls(format!("failed to parse certificate {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load a PEM private key.
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::Tls(format!("failed to open key {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TransportError::Tls(format!("failed to parse key {}: {e}", path.display())))?
        .ok_or_else(|| TransportError::Tls(format!("no private key found in {}", path.display())))
}

/// Trust anchors: the configured CA bundle, or the webpki roots.
fn build_root_store(ca_path: Option<&Path>) -> Result<RootCertStore, TransportError> {
    match ca_path {
        Some(path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| {
                    TransportError::Tls(format!("invalid CA certificate in {}: {e}", path.display()))
                })?;
            }
            Ok(roots)
        }
        None => Ok(RootCertStore::from_iter(
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_cert_file_is_a_tls_error() {
        let tls = TlsSettings::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        let err = build_client_config(&tls, &["h2"]).unwrap_err();
        assert!(matches!(err, TransportError::Tls(_)));
        assert!(err.to_string().contains("cert.pem"));
    }

    #[test]
    fn test_empty_cert_file_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("masque-tunnel-empty-{}.pem", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(b"not pem data").unwrap();

        let err = load_certs(&path).unwrap_err();
        assert!(err.to_string().contains("no certificates found"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_default_root_store_is_populated() {
        let roots = build_root_store(None).unwrap();
        assert!(!roots.is_empty());
    }
}
