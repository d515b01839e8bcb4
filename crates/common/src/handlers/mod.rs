//! Resource handlers.
//!
//! Each handler checks its method whitelist, then its protocol
//! preconditions, then makes a single call to the authority or storage and
//! formats the result. Handlers return `Err` for every failure and leave the
//! problem document to [`crate::problem::to_error_response`].

pub mod authorization;
pub mod certificate;
pub mod directory;
pub mod registration;

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use http::{Method, Request, Response};
use serde::de::DeserializeOwned;

use crate::authority::AuthorityError;
use crate::error::WfeError;
use crate::models::Account;
use crate::request_signing::{VerificationError, VerifiedRequest};
use crate::wfe::WebFrontEnd;

pub(crate) type HandlerResult = Result<Response<Bytes>, Report<WfeError>>;

pub(crate) const AGREEMENT_REQUIRED: &str =
    "Must agree to subscriber agreement before any further actions";

/// Reject methods outside `allowed` with a 405 carrying `allow`.
pub(crate) fn require_method(
    req: &Request<Bytes>,
    allowed: &[Method],
    allow: &'static str,
) -> Result<(), Report<WfeError>> {
    if allowed.contains(req.method()) {
        Ok(())
    } else {
        Err(Report::new(WfeError::method_not_allowed(allow))
            .attach(format!("{} {}", req.method(), req.uri().path())))
    }
}

/// Collapse a verifier failure into what the client is allowed to learn.
/// The precise failure stays in the report.
pub(crate) fn verification_failure(report: Report<VerificationError>) -> Report<WfeError> {
    let err = match report.current_context() {
        VerificationError::UnknownAccount => {
            WfeError::unauthorized("No registration exists matching provided key")
        }
        VerificationError::AccountLookup => WfeError::internal("Unable to look up registration"),
        _ => WfeError::malformed("Unable to read/verify body"),
    };
    report.change_context(err)
}

/// Map an authority failure to its kind, showing the client `detail`.
pub(crate) fn authority_failure(report: Report<AuthorityError>, detail: &str) -> Report<WfeError> {
    let kind = report.current_context().kind();
    report.change_context(WfeError::new(kind, detail))
}

pub(crate) fn parse_payload<T: DeserializeOwned>(
    payload: &[u8],
    detail: &str,
) -> Result<T, Report<WfeError>> {
    serde_json::from_slice(payload).change_context(WfeError::malformed(detail))
}

/// Verify a request that must come from a registered account.
pub(crate) async fn verify_with_account(
    wfe: &WebFrontEnd,
    body: &[u8],
) -> Result<(VerifiedRequest, Account), Report<WfeError>> {
    let mut verified = wfe
        .verifier
        .verify(body, true)
        .await
        .map_err(verification_failure)?;
    let account = verified.account.take().ok_or_else(|| {
        Report::new(WfeError::unauthorized(
            "No registration exists matching provided key",
        ))
    })?;
    Ok((verified, account))
}

/// Any accepted agreement version is enough outside registration updates.
pub(crate) fn require_agreement(account: &Account) -> Result<(), Report<WfeError>> {
    if account.has_agreed() {
        Ok(())
    } else {
        Err(Report::new(WfeError::unauthorized(AGREEMENT_REQUIRED))
            .attach(format!("Registration {}", account.id)))
    }
}

/// A supplied agreement must be the currently published one.
pub(crate) fn check_agreement(
    wfe: &WebFrontEnd,
    agreement: Option<&str>,
) -> Result<(), Report<WfeError>> {
    match agreement {
        Some(supplied) if !supplied.is_empty() => {
            let current = wfe.subscriber_agreement_url.as_deref().unwrap_or_default();
            if supplied == current {
                Ok(())
            } else {
                Err(Report::new(WfeError::malformed(format!(
                    "Provided agreement URL [{}] does not match current agreement URL [{}]",
                    supplied, current
                ))))
            }
        }
        _ => Ok(()),
    }
}
