//! Moves requests between hyper and the platform-agnostic front end.

use bytes::Bytes;
use error_stack::Report;
use http::{Request, Response};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;

use acme_wfe_common::error::WfeError;
use acme_wfe_common::{reject_request, route_request, WebFrontEnd};

/// Buffer the body, at most `max_body_bytes` of it, and route the request.
pub async fn serve_request(
    wfe: &WebFrontEnd,
    req: Request<Incoming>,
    max_body_bytes: usize,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let response = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => {
            let req = Request::from_parts(parts, collected.to_bytes());
            route_request(wfe, req).await
        }
        Err(e) => {
            let report = Report::new(WfeError::malformed("Unable to read request body"))
                .attach(format!("{} {}: {e}", parts.method, parts.uri.path()));
            reject_request(wfe, &report)
        }
    };
    response.map(Full::new)
}
