//! TLS configuration and certificate loading.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

/// Installs ring as the process-wide rustls provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, io::Error> {
    for (path, what) in [(cert_path, "Certificate"), (key_path, "Private key")] {
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} file not found: {:?}", what, path),
            ));
        }
    }

    install_crypto_provider();
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Reads a PEM certificate for use as a trusted root by HTTPS clients.
pub fn load_root_certificate(cert_path: &Path) -> Result<reqwest::Certificate, io::Error> {
    let pem = std::fs::read(cert_path)?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
