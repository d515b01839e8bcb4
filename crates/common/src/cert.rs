//! X.509 parsing for submitted certificates and certificate requests.

use derive_more::Display;
use error_stack::Report;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use crate::models::Serial;

#[derive(Debug, Display)]
pub enum CertificateError {
    #[display("Malformed certificate")]
    MalformedCertificate,
    #[display("Malformed certificate request")]
    MalformedRequest,
}

impl core::error::Error for CertificateError {}

/// The parts of a DER certificate the front end acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub der: Vec<u8>,
    pub serial: Serial,
    /// SubjectPublicKeyInfo key bits.
    pub subject_key: Vec<u8>,
}

impl ParsedCertificate {
    /// Parse a single DER certificate. Trailing bytes are rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if `der` is not exactly one well formed certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, Report<CertificateError>> {
        let (rest, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| {
            Report::new(CertificateError::MalformedCertificate).attach(e.to_string())
        })?;
        if !rest.is_empty() {
            return Err(Report::new(CertificateError::MalformedCertificate)
                .attach(format!("{} trailing bytes after certificate", rest.len())));
        }

        Ok(Self {
            der: der.to_vec(),
            serial: Serial::from_be_bytes(cert.tbs_certificate.raw_serial()),
            subject_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }
}

/// DNS names requested by a PKCS#10 request: the subject common name
/// followed by any subjectAltName entries, deduplicated.
///
/// # Errors
///
/// Returns an error if `der` is not a well formed request.
pub fn requested_names(der: &[u8]) -> Result<Vec<String>, Report<CertificateError>> {
    let (_, csr) = X509CertificationRequest::from_der(der).map_err(|e| {
        Report::new(CertificateError::MalformedRequest).attach(e.to_string())
    })?;

    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.to_ascii_lowercase();
        if !names.contains(&name) {
            names.push(name);
        }
    };

    for attr in csr.certification_request_info.subject.iter_common_name() {
        if let Ok(cn) = attr.as_str() {
            push(cn);
        }
    }
    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        push(dns);
                    }
                }
            }
        }
    }

    Ok(names)
}
