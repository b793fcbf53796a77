//! # Trust & Transport
//!
//! Builds HTTPS clients whose trust store is the system pool augmented with
//! caller-provided CA certificates. A client is built once per reconcile so
//! that a record-referenced CA (from a Maven auth secret) can be injected
//! without affecting other records.

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use oci_distribution::client::{Certificate as RegistryCertificate, CertificateEncoding};

/// PEM-encoded CA material from one of the available origins. Empty sources
/// are skipped when the trust store is assembled.
#[derive(Debug, Clone)]
pub enum CertSource {
    /// Filesystem path to a PEM bundle
    Path(PathBuf),
    /// DER bytes of a single parsed certificate
    Der(Vec<u8>),
    /// Raw PEM bytes
    Pem(Vec<u8>),
}

impl CertSource {
    /// PEM bytes of this source. A missing file or unreadable path is a
    /// fatal configuration error.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match self {
            CertSource::Path(path) => std::fs::read(path)
                .with_context(|| format!("unable to read CA certificate {}", path.display())),
            CertSource::Der(der) => Ok(pem_encode(der)),
            CertSource::Pem(raw) => Ok(raw.clone()),
        }
    }
}

fn pem_encode(der: &[u8]) -> Vec<u8> {
    let mut out = String::from("-----BEGIN CERTIFICATE-----\n");
    let encoded = BASE64.encode(der);
    for chunk in encoded.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 output is ascii"));
        out.push('\n');
    }
    out.push_str("-----END CERTIFICATE-----\n");
    out.into_bytes()
}

/// Build an HTTPS client trusting the system pool plus the given CAs.
/// TLS verification is always on; a PEM that fails to parse is fatal.
pub fn build_http_client(certs: &[CertSource]) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    for cert in certs {
        let data = cert.bytes()?;
        if data.is_empty() {
            continue;
        }
        let parsed = reqwest::Certificate::from_pem_bundle(&data)
            .context("unable to load custom CA certificate")?;
        for certificate in parsed {
            builder = builder.add_root_certificate(certificate);
        }
    }
    builder.build().context("unable to build HTTP client")
}

/// The same trust material in the shape the registry client consumes
pub fn registry_trust_anchors(certs: &[CertSource]) -> Result<Vec<RegistryCertificate>> {
    let mut anchors = Vec::new();
    for cert in certs {
        let data = cert.bytes()?;
        if data.is_empty() {
            continue;
        }
        // parse up front so a bad PEM fails the reconcile instead of being
        // silently ignored by the registry client
        reqwest::Certificate::from_pem_bundle(&data)
            .context("unable to load custom CA certificate")?;
        anchors.push(RegistryCertificate {
            encoding: CertificateEncoding::Pem,
            data,
        });
    }
    Ok(anchors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_are_skipped() {
        let certs = vec![CertSource::Pem(Vec::new())];
        assert!(build_http_client(&certs).is_ok());
        assert!(registry_trust_anchors(&certs).unwrap().is_empty());
    }

    #[test]
    fn unparseable_pem_is_fatal() {
        let certs = vec![CertSource::Pem(b"not a certificate".to_vec())];
        assert!(build_http_client(&certs).is_err());
        assert!(registry_trust_anchors(&certs).is_err());
    }

    #[test]
    fn missing_path_is_fatal() {
        let certs = vec![CertSource::Path(PathBuf::from("/does/not/exist.pem"))];
        assert!(build_http_client(&certs).is_err());
    }

    #[test]
    fn der_bytes_are_pem_wrapped() {
        let pem = String::from_utf8(CertSource::Der(vec![1, 2, 3]).bytes().unwrap()).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(pem.trim_end().ends_with("-----END CERTIFICATE-----"));
    }
}
