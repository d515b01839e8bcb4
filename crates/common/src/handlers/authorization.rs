use bytes::Bytes;
use error_stack::Report;
use http::{header, Method, Request, StatusCode};

use super::{
    authority_failure, parse_payload, require_agreement, require_method, verify_with_account,
    HandlerResult,
};
use crate::error::WfeError;
use crate::http_util::ResponseBuilder;
use crate::models::{Authorization, ChallengeResponse, NewAuthorization};
use crate::storage::StorageError;
use crate::wfe::WebFrontEnd;

/// POST new-authz: start proving control of an identifier.
pub async fn new_authorization(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::POST], "POST")?;

    let (verified, account) = verify_with_account(wfe, req.body()).await?;
    require_agreement(&account)?;

    let draft: NewAuthorization = parse_payload(&verified.payload, "Error unmarshaling JSON")?;
    let authz = wfe
        .authority
        .create_authorization(draft, account.id)
        .await
        .map_err(|e| authority_failure(e, "Error creating new authz"))?;
    wfe.metrics.pending_authorizations.inc();

    let location = format!("{}{}", wfe.endpoints.authz, authz.id);
    Ok(ResponseBuilder::new(StatusCode::CREATED)
        .json(&authz.public_view(), "authz")?
        .header(header::LOCATION, &location)
        .link(&wfe.endpoints.new_cert, "next")
        .build())
}

/// GET or POST authz/{id}, with a query string addressing one challenge.
pub async fn authorization(wfe: &WebFrontEnd, req: &Request<Bytes>, id: &str) -> HandlerResult {
    require_method(req, &[Method::GET, Method::POST], "GET, POST")?;

    let authz = match wfe.storage.authorization(id).await {
        Ok(authz) => authz,
        Err(report) if *report.current_context() == StorageError::NotFound => {
            return Err(report.change_context(WfeError::not_found("Unable to find authorization")));
        }
        Err(report) => {
            return Err(report.change_context(WfeError::internal("Unable to load authorization")));
        }
    };

    if req.uri().query().is_some_and(|q| !q.is_empty()) {
        return challenge(wfe, req, &authz).await;
    }

    if req.method() != Method::GET {
        return Err(Report::new(WfeError::method_not_allowed("GET, POST"))
            .attach("POST to an authorization without a challenge query"));
    }

    Ok(ResponseBuilder::new(StatusCode::OK)
        .json(&authz.public_view(), "authorization")?
        .link(&wfe.endpoints.new_cert, "next")
        .build())
}

/// Path and query of a challenge URI, as a request would carry them.
fn uri_path_and_query(uri: &str) -> Option<String> {
    let url = url::Url::parse(uri).ok()?;
    Some(match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    })
}

/// Index of the challenge whose URI the request addresses.
fn find_challenge(authz: &Authorization, req: &Request<Bytes>) -> Option<usize> {
    let requested = req.uri().path_and_query()?.as_str();
    authz
        .challenges
        .iter()
        .position(|c| uri_path_and_query(&c.uri).as_deref() == Some(requested))
}

async fn challenge(wfe: &WebFrontEnd, req: &Request<Bytes>, authz: &Authorization) -> HandlerResult {
    let index = find_challenge(authz, req).ok_or_else(|| {
        Report::new(WfeError::not_found("Unable to find challenge"))
            .attach(format!("Authorization {}", authz.id))
    })?;
    let authz_url = format!("{}{}", wfe.endpoints.authz, authz.id);

    if req.method() == Method::GET {
        let challenge = &authz.challenges[index];
        return Ok(ResponseBuilder::new(StatusCode::ACCEPTED)
            .json(challenge, "challenge")?
            .header(header::LOCATION, &challenge.uri)
            .link(&authz_url, "up")
            .build());
    }

    let (verified, account) = verify_with_account(wfe, req.body()).await?;
    require_agreement(&account)?;
    if account.id != authz.registration_id {
        return Err(Report::new(WfeError::unauthorized(
            "User registration ID doesn't match registration ID in authorization",
        ))
        .attach(format!(
            "Registration {} answered a challenge of authorization {} owned by {}",
            account.id, authz.id, authz.registration_id
        )));
    }

    let response: ChallengeResponse =
        parse_payload(&verified.payload, "Error unmarshaling challenge response")?;
    let updated = wfe
        .authority
        .update_authorization(authz, index, response)
        .await
        .map_err(|e| authority_failure(e, "Unable to update authorization"))?;

    let challenge = updated.challenges.get(index).ok_or_else(|| {
        Report::new(WfeError::internal("Failed to update challenge"))
            .attach(format!("Challenge index {} missing after update", index))
    })?;
    Ok(ResponseBuilder::new(StatusCode::ACCEPTED)
        .json(challenge, "challenge")?
        .header(header::LOCATION, &challenge.uri)
        .link(&authz_url, "up")
        .build())
}
