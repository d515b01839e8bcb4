use bytes::Bytes;
use error_stack::{Report, ResultExt};
use http::{header, Method, Request, StatusCode};

use super::{
    authority_failure, parse_payload, require_agreement, require_method, verification_failure,
    verify_with_account, HandlerResult,
};
use crate::cert::ParsedCertificate;
use crate::constants::CONTENT_TYPE_PKIX_CERT;
use crate::error::WfeError;
use crate::http_util::ResponseBuilder;
use crate::models::{CertificateRequest, CertificateStatus, RevocationRequest, ShortSerial};
use crate::storage::StorageError;
use crate::wfe::WebFrontEnd;

/// POST new-cert: issue a certificate for a CSR.
pub async fn new_certificate(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::POST], "POST")?;

    let (verified, account) = verify_with_account(wfe, req.body()).await?;
    require_agreement(&account)?;

    let request: CertificateRequest =
        parse_payload(&verified.payload, "Error unmarshaling certificate request")?;
    log::info!(
        "Certificate request - registration {} key {} authorizations {:?}",
        account.id,
        verified.key.thumbprint(),
        request.authorizations
    );

    let cert = wfe
        .authority
        .issue_certificate(request, account.id)
        .await
        .map_err(|e| authority_failure(e, "Error creating new cert"))?;
    wfe.metrics.certificates.inc();

    let short = cert.serial.short().ok_or_else(|| {
        Report::new(WfeError::internal("Error creating new cert"))
            .attach(format!("Serial {} has no short form", cert.serial))
    })?;

    Ok(ResponseBuilder::new(StatusCode::CREATED)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_PKIX_CERT)
        .header(header::LOCATION, &format!("{}{}", wfe.endpoints.cert, short))
        .link(&wfe.endpoints.issuer, "up")
        .body(cert.der)
        .build())
}

/// GET cert/{short serial}. POST is reserved.
pub async fn certificate(wfe: &WebFrontEnd, req: &Request<Bytes>, id: &str) -> HandlerResult {
    require_method(req, &[Method::GET, Method::POST], "GET, POST")?;
    if req.method() == Method::POST {
        return Err(Report::new(WfeError::not_found("Not yet supported")));
    }

    let short = ShortSerial::parse(id).ok_or_else(|| {
        Report::new(WfeError::not_found("Certificate not found")).attach(format!("Bad serial {id}"))
    })?;

    let cert = match wfe.storage.certificate_by_short_serial(&short).await {
        Ok(cert) => cert,
        Err(report) => {
            let err = match report.current_context() {
                StorageError::NotFound => WfeError::not_found("Certificate not found"),
                StorageError::Ambiguous => {
                    WfeError::conflict("Multiple certificates with same short serial")
                }
                StorageError::Backend => WfeError::internal("Unable to load certificate"),
            };
            return Err(report.change_context(err));
        }
    };

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_PKIX_CERT)
        .link(&wfe.endpoints.issuer, "up")
        .body(cert.der)
        .build())
}

/// POST revoke-cert. Either the certificate key or the owning account may
/// revoke.
pub async fn revoke_certificate(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::POST], "POST")?;

    let verified = wfe
        .verifier
        .verify(req.body(), false)
        .await
        .map_err(verification_failure)?;

    let request: RevocationRequest = parse_payload(&verified.payload, "Unable to read/parse body")?;
    let parsed = ParsedCertificate::from_der(&request.certificate)
        .change_context(WfeError::malformed("Unable to read/parse body"))?;

    let stored = match wfe.storage.certificate(&parsed.serial).await {
        Ok(cert) if cert.der == parsed.der => cert,
        Ok(_) => {
            return Err(Report::new(WfeError::not_found("No such certificate"))
                .attach(format!("DER mismatch for serial {}", parsed.serial)));
        }
        Err(report) if *report.current_context() == StorageError::Backend => {
            return Err(report.change_context(WfeError::internal("Unable to load certificate")));
        }
        Err(report) => {
            return Err(report.change_context(WfeError::not_found("No such certificate")));
        }
    };

    if stored.status == CertificateStatus::Revoked {
        return Err(Report::new(WfeError::conflict("Certificate already revoked")));
    }

    let key_matches = verified.key.matches_subject_key(&parsed.subject_key);
    let account_matches = verified
        .account
        .as_ref()
        .is_some_and(|account| account.id == stored.registration_id);
    if !key_matches && !account_matches {
        return Err(Report::new(WfeError::unauthorized(
            "Revocation request must be signed by private key of cert to be revoked, or by the account key of the account that issued it.",
        ))
        .attach(format!("Serial {}", parsed.serial)));
    }

    wfe.authority
        .revoke_certificate(&parsed)
        .await
        .map_err(|e| authority_failure(e, "Failed to revoke certificate"))?;
    wfe.metrics.revoked_certificates.inc();

    log::info!(
        "Revoked certificate {} - key match {} account match {}",
        parsed.serial,
        key_matches,
        account_matches
    );
    Ok(ResponseBuilder::new(StatusCode::OK).build())
}
