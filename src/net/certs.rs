//! Self-signed certificate lifecycle for the RPC listeners.
//!
//! # Responsibilities
//! - Keep `<dir>/cert.pem` and `<dir>/key.pem` present and unexpired
//! - Generate a P-256 server certificate covering this host's names
//! - Verify PEM-encoded certificates
//!
//! # Design Decisions
//! - Blocking I/O; callers run it on the blocking pool
//! - One writer per directory (the RPC subsystem)

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use rand::RngCore;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::CertificateDer;
use rustls_pemfile::Item;
use thiserror::Error;
use time::OffsetDateTime;

use crate::net::interfaces;

pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Validity of a generated certificate.
pub const VALIDITY_DAYS: i64 = 365;

const PEM_BEGIN: &[u8] = b"-----BEGIN ";

const ORGANIZATION: &str = "trading-daemon autogenerated cert";

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate data is nil")]
    DataIsNil,

    #[error("certificate type invalid")]
    TypeInvalid,

    #[error("certificate expired")]
    Expired,

    #[error("certificate parse failed: {0}")]
    Parse(String),

    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("certificate I/O error: {0}")]
    Io(#[from] io::Error),
}

pub fn cert_path(dir: &Path) -> PathBuf {
    dir.join(CERT_FILE)
}

pub fn key_path(dir: &Path) -> PathBuf {
    dir.join(KEY_FILE)
}

/// Makes sure `dir` holds a usable certificate, generating one when missing
/// or expired.
pub fn ensure(dir: &Path) -> Result<(), CertError> {
    std::fs::create_dir_all(dir)?;

    let cert = cert_path(dir);
    if !cert.exists() || !key_path(dir).exists() {
        tracing::warn!(dir = %dir.display(), "TLS certificate or key missing, generating");
        return generate(dir);
    }

    let pem = std::fs::read(&cert)?;
    let der = certificate_der(&pem)?;

    if OffsetDateTime::now_utc() > not_after(&der)? {
        tracing::warn!(path = %cert.display(), "TLS certificate expired, regenerating");
        return generate(dir);
    }

    tracing::debug!(path = %cert.display(), "TLS certificate valid");
    Ok(())
}

/// Generates a fresh certificate and key into `dir`.
pub fn generate(dir: &Path) -> Result<(), CertError> {
    let now = OffsetDateTime::now_utc();
    generate_with_validity(dir, now, now + time::Duration::days(VALIDITY_DAYS))
}

fn generate_with_validity(
    dir: &Path,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
) -> Result<(), CertError> {
    let host = interfaces::hostname()?;
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;

    let mut params = CertificateParams::new(subject_alt_names(&host))?;
    params.not_before = not_before;
    params.not_after = not_after;
    params.serial_number = Some(random_serial());
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, ORGANIZATION);
    name.push(DnType::CommonName, host.as_str());
    params.distinguished_name = name;

    let cert = params.self_signed(&key_pair)?;

    std::fs::create_dir_all(dir)?;
    write_private(&cert_path(dir), cert.pem().as_bytes())?;
    write_private(&key_path(dir), key_pair.serialize_pem().as_bytes())?;

    tracing::info!(
        dir = %dir.display(),
        host = %host,
        expires = %not_after,
        "TLS certificate generated"
    );
    Ok(())
}

/// Hostname, `localhost` unless that is the hostname, loopback addresses and
/// every global unicast interface address.
fn subject_alt_names(host: &str) -> Vec<String> {
    let mut names = vec![host.to_string()];
    if host != "localhost" {
        names.push("localhost".to_string());
    }

    let mut ips = vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)];
    match interfaces::interface_addresses() {
        Ok(addrs) => {
            for addr in addrs.into_iter().filter(interfaces::is_global_unicast) {
                if !ips.contains(&addr) {
                    ips.push(addr);
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Unable to list interface addresses"),
    }

    names.extend(ips.iter().map(IpAddr::to_string));
    names
}

fn random_serial() -> SerialNumber {
    let mut serial = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut serial);
    // Keep the DER integer positive.
    serial[0] &= 0x7f;
    SerialNumber::from_slice(&serial)
}

fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Checks a PEM-encoded certificate: present, of type CERTIFICATE, parseable
/// and unexpired.
pub fn verify(pem: &[u8]) -> Result<(), CertError> {
    let der = certificate_der(pem)?;

    if OffsetDateTime::now_utc() > not_after(&der)? {
        return Err(CertError::Expired);
    }
    Ok(())
}

/// First PEM block of `pem`, which must be a certificate.
fn certificate_der(pem: &[u8]) -> Result<CertificateDer<'static>, CertError> {
    let mut reader = pem;
    match rustls_pemfile::read_one(&mut reader).map_err(|e| CertError::Parse(e.to_string()))? {
        Some(Item::X509Certificate(der)) => Ok(der),
        Some(_) => Err(CertError::TypeInvalid),
        // read_one skips blocks with labels it does not know
        None if has_pem_block(pem) => Err(CertError::TypeInvalid),
        None => Err(CertError::DataIsNil),
    }
}

fn has_pem_block(pem: &[u8]) -> bool {
    pem.windows(PEM_BEGIN.len()).any(|w| w == PEM_BEGIN)
}

fn not_after(der: &CertificateDer<'_>) -> Result<OffsetDateTime, CertError> {
    CertificateParams::from_ca_cert_der(der)
        .map(|params| params.not_after)
        .map_err(|e| CertError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_generates_into_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tls = dir.path().join("tls");
        ensure(&tls).unwrap();

        let pem = std::fs::read(cert_path(&tls)).unwrap();
        verify(&pem).unwrap();
        assert!(key_path(&tls).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(key_path(&tls)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_ensure_keeps_valid_certificate() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path()).unwrap();
        let cert = std::fs::read(cert_path(dir.path())).unwrap();
        let key = std::fs::read(key_path(dir.path())).unwrap();

        ensure(dir.path()).unwrap();
        assert_eq!(std::fs::read(cert_path(dir.path())).unwrap(), cert);
        assert_eq!(std::fs::read(key_path(dir.path())).unwrap(), key);
    }

    #[test]
    fn test_ensure_regenerates_expired_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let past = OffsetDateTime::now_utc() - time::Duration::days(30);
        generate_with_validity(dir.path(), past - time::Duration::days(1), past).unwrap();

        let expired = std::fs::read(cert_path(dir.path())).unwrap();
        assert!(matches!(verify(&expired), Err(CertError::Expired)));
        let old_key = std::fs::read(key_path(dir.path())).unwrap();

        ensure(dir.path()).unwrap();
        let renewed = std::fs::read(cert_path(dir.path())).unwrap();
        verify(&renewed).unwrap();
        assert_ne!(std::fs::read(key_path(dir.path())).unwrap(), old_key);
    }

    #[test]
    fn test_ensure_rejects_empty_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(cert_path(dir.path()), b"not a pem").unwrap();
        std::fs::write(key_path(dir.path()), b"not a pem").unwrap();
        assert!(matches!(ensure(dir.path()), Err(CertError::DataIsNil)));
    }

    #[test]
    fn test_verify_errors() {
        assert!(matches!(verify(b""), Err(CertError::DataIsNil)));

        let dir = tempfile::tempdir().unwrap();
        generate(dir.path()).unwrap();
        let key = std::fs::read(key_path(dir.path())).unwrap();
        assert!(matches!(verify(&key), Err(CertError::TypeInvalid)));
    }

    #[test]
    fn test_verify_foreign_pem_label_is_type_invalid() {
        let foreign = b"-----BEGIN FOO-----\nAAAA\n-----END FOO-----\n";
        assert!(matches!(verify(foreign), Err(CertError::TypeInvalid)));
        assert!(matches!(verify(b"not a pem"), Err(CertError::DataIsNil)));

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(cert_path(dir.path()), foreign).unwrap();
        std::fs::write(key_path(dir.path()), b"unused").unwrap();
        assert!(matches!(ensure(dir.path()), Err(CertError::TypeInvalid)));
    }

    #[test]
    fn test_subject_alt_names_cover_loopback() {
        let names = subject_alt_names("build-host");
        assert_eq!(names[0], "build-host");
        assert!(names.contains(&"localhost".to_string()));
        assert!(names.contains(&"127.0.0.1".to_string()));
        assert!(names.contains(&"::1".to_string()));

        let names = subject_alt_names("localhost");
        assert_eq!(names.iter().filter(|n| *n == "localhost").count(), 1);
    }
}
