use bytes::Bytes;
use error_stack::Report;
use http::{header, Method, Request, StatusCode};

use super::{
    authority_failure, check_agreement, parse_payload, require_method, verification_failure,
    verify_with_account, HandlerResult,
};
use crate::error::WfeError;
use crate::http_util::ResponseBuilder;
use crate::models::{AccountId, AccountUpdate, NewAccount};
use crate::wfe::WebFrontEnd;

/// POST new-reg: bind a fresh key to a new account.
pub async fn new_registration(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::POST], "POST")?;

    let verified = wfe
        .verifier
        .verify(req.body(), false)
        .await
        .map_err(verification_failure)?;
    if let Some(existing) = verified.account {
        return Err(Report::new(WfeError::conflict(
            "Registration key is already in use",
        ))
        .attach(format!("Registration {}", existing.id)));
    }

    let payload: AccountUpdate = parse_payload(&verified.payload, "Error unmarshaling JSON")?;
    check_agreement(wfe, payload.agreement.as_deref())?;

    let draft = NewAccount {
        key: verified.key,
        contact: payload.contact.unwrap_or_default(),
        agreement: payload.agreement.filter(|a| !a.is_empty()),
    };
    let account = wfe
        .authority
        .create_account(draft)
        .await
        .map_err(|e| authority_failure(e, "Error creating new registration"))?;
    wfe.metrics.registrations.inc();

    let location = format!("{}{}", wfe.endpoints.reg, account.id);
    let mut builder = ResponseBuilder::new(StatusCode::CREATED)
        .json(&account, "registration")?
        .header(header::LOCATION, &location)
        .link(&wfe.endpoints.new_authz, "next");
    if let Some(terms) = &wfe.subscriber_agreement_url {
        builder = builder.link(terms, "terms-of-service");
    }
    Ok(builder.build())
}

/// Account ids in paths are positive decimal integers.
fn parse_account_id(id: &str) -> Result<AccountId, Report<WfeError>> {
    let parsed: AccountId = id
        .parse()
        .map_err(|_| Report::new(WfeError::malformed("Registration ID must be an integer")))?;
    if parsed <= 0 {
        return Err(Report::new(WfeError::malformed(
            "Registration ID must be a positive non-zero integer",
        )));
    }
    Ok(parsed)
}

/// POST reg/{id}: update contact or agreement. The key never changes here.
pub async fn update_registration(wfe: &WebFrontEnd, req: &Request<Bytes>, id: &str) -> HandlerResult {
    require_method(req, &[Method::POST], "POST")?;

    let (verified, account) = verify_with_account(wfe, req.body()).await?;

    let id = parse_account_id(id)?;
    if id != account.id {
        return Err(Report::new(WfeError::unauthorized(
            "Request signing key did not match registration key",
        ))
        .attach(format!("Path id {} but signer is {}", id, account.id)));
    }

    let update: AccountUpdate = parse_payload(&verified.payload, "Error unmarshaling registration")?;
    check_agreement(wfe, update.agreement.as_deref())?;

    let mut updated = wfe
        .authority
        .update_account(&account, update)
        .await
        .map_err(|e| authority_failure(e, "Unable to update registration"))?;
    if updated.key != account.key {
        log::warn!(
            "Authority returned a different key for registration {}; keeping the bound key",
            account.id
        );
        updated.key = account.key;
    }

    Ok(ResponseBuilder::new(StatusCode::ACCEPTED)
        .json(&updated, "registration")?
        .build())
}
