use bytes::Bytes;
use error_stack::{Report, ResultExt};
use http::header::{self, HeaderName};
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;

use crate::constants::{CONTENT_TYPE_JSON, HEADER_REPLAY_NONCE};
use crate::error::WfeError;

/// Format a `Link` header value.
#[must_use]
pub fn link(url: &str, relation: &str) -> String {
    format!("<{}>;rel=\"{}\"", url, relation)
}

/// Set the headers every response carries: a fresh anti-replay nonce and a
/// permissive CORS origin.
pub fn set_standard_headers(response: &mut Response<Bytes>, nonce: &str) {
    let headers = response.headers_mut();
    match HeaderValue::from_str(nonce) {
        Ok(value) => {
            headers.insert(HEADER_REPLAY_NONCE, value);
        }
        Err(e) => log::warn!("Issued nonce is not a valid header value: {}", e),
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

/// Small builder over [`Response`] used by the resource handlers.
#[derive(Debug)]
pub struct ResponseBuilder {
    response: Response<Bytes>,
}

impl ResponseBuilder {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = status;
        Self { response }
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Errors
    ///
    /// Serialization failures are internal errors: every value rendered here
    /// was produced by this service or its collaborators.
    pub fn json<T: Serialize>(
        self,
        value: &T,
        what: &str,
    ) -> Result<Self, Report<WfeError>> {
        let body = serde_json::to_vec(value)
            .change_context(WfeError::internal(format!("Failed to marshal {}", what)))?;
        Ok(self
            .header(header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body))
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        *self.response.body_mut() = body.into();
        self
    }

    /// Replace any existing value of `name`.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.response.headers_mut().insert(name, value);
            }
            Err(e) => log::warn!("Dropping invalid {} header value: {}", name.as_str(), e),
        }
        self
    }

    /// Add a `Link` header alongside any already present.
    #[must_use]
    pub fn link(mut self, url: &str, relation: &str) -> Self {
        match HeaderValue::from_str(&link(url, relation)) {
            Ok(value) => {
                self.response.headers_mut().append(header::LINK, value);
            }
            Err(e) => log::warn!("Dropping invalid link to {}: {}", url, e),
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Response<Bytes> {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_formats_relation() {
        assert_eq!(
            link("https://ca.example/acme/new-authz", "next"),
            "<https://ca.example/acme/new-authz>;rel=\"next\""
        );
    }

    #[test]
    fn standard_headers_carry_nonce_and_cors() {
        let mut response = ResponseBuilder::new(StatusCode::OK).build();
        set_standard_headers(&mut response, "abc123");

        assert_eq!(
            response.headers().get(HEADER_REPLAY_NONCE).expect("nonce"),
            "abc123"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("cors"),
            "*"
        );
    }

    #[test]
    fn multiple_links_are_appended() {
        let response = ResponseBuilder::new(StatusCode::CREATED)
            .link("https://ca.example/acme/new-authz", "next")
            .link("https://ca.example/terms", "terms-of-service")
            .build();

        let links: Vec<_> = response.headers().get_all(header::LINK).iter().collect();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1], "<https://ca.example/terms>;rel=\"terms-of-service\"");
    }

    #[test]
    fn json_sets_content_type_and_body() {
        let response = ResponseBuilder::new(StatusCode::OK)
            .json(&serde_json::json!({"status": "valid"}), "status")
            .expect("should serialize")
            .build();

        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            CONTENT_TYPE_JSON
        );
        assert_eq!(response.body().as_ref(), br#"{"status":"valid"}"#);
    }
}
