//! Request dispatch.

use bytes::Bytes;
use error_stack::Report;
use http::{Request, Response};

use crate::error::WfeError;
use crate::handlers::{authorization, certificate, directory, registration, HandlerResult};
use crate::http_util::set_standard_headers;
use crate::problem::to_error_response;
use crate::wfe::{Route, WebFrontEnd};

async fn dispatch(wfe: &WebFrontEnd, route: Route, id: &str, req: &Request<Bytes>) -> HandlerResult {
    match route {
        Route::Index => directory::index(wfe, req),
        Route::NewRegistration => registration::new_registration(wfe, req).await,
        Route::Registration => registration::update_registration(wfe, req, id).await,
        Route::NewAuthorization => authorization::new_authorization(wfe, req).await,
        Route::Authorization => authorization::authorization(wfe, req, id).await,
        Route::NewCertificate => certificate::new_certificate(wfe, req).await,
        Route::Certificate => certificate::certificate(wfe, req, id).await,
        Route::RevokeCertificate => certificate::revoke_certificate(wfe, req).await,
        Route::Terms => directory::terms(wfe, req),
        Route::Issuer => directory::issuer(wfe, req),
        Route::BuildId => directory::build_id(req),
    }
}

/// Render a failure that happened before routing, such as an unreadable
/// body, with the same headers a routed response gets.
#[must_use]
pub fn reject_request(wfe: &WebFrontEnd, report: &Report<WfeError>) -> Response<Bytes> {
    let mut response = to_error_response(report);
    set_standard_headers(&mut response, &wfe.nonces.issue());
    response
}

/// Route `req` to its handler and render the outcome.
///
/// Every response, error or not, carries a fresh nonce and a wildcard CORS
/// origin. The nonce is issued before the request is looked at.
pub async fn route_request(wfe: &WebFrontEnd, req: Request<Bytes>) -> Response<Bytes> {
    let nonce = wfe.nonces.issue();

    let resolved = wfe
        .router
        .at(req.uri().path())
        .map(|matched| (*matched.value, matched.params.get("id").unwrap_or_default().to_string()));

    let result = match resolved {
        Ok((route, id)) => dispatch(wfe, route, &id, &req).await,
        Err(_) => Err(Report::new(WfeError::not_found("Resource not found"))
            .attach(format!("{} {}", req.method(), req.uri().path()))),
    };

    let mut response = result.unwrap_or_else(|report| to_error_response(&report));
    set_standard_headers(&mut response, &nonce);
    response
}
