//! Static resources: index page, terms, issuer certificate and build info.

use bytes::Bytes;
use http::{header, Method, Request, StatusCode};

use super::{require_method, HandlerResult};
use crate::constants::{CONTENT_TYPE_HTML, CONTENT_TYPE_PKIX_CERT, CONTENT_TYPE_TEXT};
use crate::http_util::ResponseBuilder;
use crate::templates::render_index;
use crate::wfe::WebFrontEnd;

pub fn index(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::GET], "GET")?;

    let html = render_index(
        &wfe.endpoints.new_reg,
        wfe.subscriber_agreement_url.as_deref(),
    )?;
    Ok(ResponseBuilder::new(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_HTML)
        .body(html)
        .build())
}

pub fn terms(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::GET], "GET")?;

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_TEXT)
        .body(wfe.terms_text.clone())
        .build())
}

pub fn issuer(wfe: &WebFrontEnd, req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::GET], "GET")?;

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_PKIX_CERT)
        .body(wfe.issuer_certificate.clone())
        .build())
}

/// Version and build metadata stamped at compile time.
#[must_use]
pub fn build_info() -> String {
    format!(
        "acme-wfe={} BuildID=({}) BuildTime=({}) BuildHost=({})",
        env!("CARGO_PKG_VERSION"),
        env!("ACME_WFE_BUILD_ID"),
        env!("ACME_WFE_BUILD_TIME"),
        env!("ACME_WFE_BUILD_HOST"),
    )
}

pub fn build_id(req: &Request<Bytes>) -> HandlerResult {
    require_method(req, &[Method::GET], "GET")?;

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header(header::CONTENT_TYPE, CONTENT_TYPE_TEXT)
        .body(build_info())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tests::{response_json, TestFrontEnd};

    #[tokio::test]
    async fn index_page_links_new_registration() {
        let fe = TestFrontEnd::new();
        let response = fe.get("/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            CONTENT_TYPE_HTML
        );
        let html = String::from_utf8_lossy(response.body());
        assert!(html.contains("http://localhost:4000/acme/new-reg"));
    }

    #[tokio::test]
    async fn static_resources_are_get_only() {
        let fe = TestFrontEnd::new();
        for path in ["/", "/terms", "/acme/issuer-cert", "/build"] {
            let response = fe.request(crate::test_support::tests::post(path, Vec::new())).await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{path}");
            assert_eq!(response.headers().get(header::ALLOW).expect("allow"), "GET");
        }
    }

    #[tokio::test]
    async fn terms_and_issuer_are_served() {
        let fe = TestFrontEnd::new();

        let terms = fe.get("/terms").await;
        assert_eq!(terms.status(), StatusCode::OK);
        assert_eq!(terms.body().as_ref(), b"Test terms of service.");

        let issuer = fe.get("/acme/issuer-cert").await;
        assert_eq!(issuer.status(), StatusCode::OK);
        assert_eq!(
            issuer.headers().get(header::CONTENT_TYPE).expect("content type"),
            CONTENT_TYPE_PKIX_CERT
        );
        assert!(crate::cert::ParsedCertificate::from_der(issuer.body()).is_ok());
    }

    #[tokio::test]
    async fn build_info_names_version() {
        let fe = TestFrontEnd::new();
        let response = fe.get("/build").await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8_lossy(response.body());
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_problem() {
        let fe = TestFrontEnd::new();
        let response = fe.get("/acme/unknown").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response_json(&response)["type"], "urn:acme:error:malformed");
    }
}
