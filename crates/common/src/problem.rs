//! Problem documents and the error half of the response formatter.

use bytes::Bytes;
use error_stack::Report;
use http::{header, HeaderValue, Response};
use serde::Serialize;

use crate::constants::{AUDIT_TARGET, CONTENT_TYPE_PROBLEM};
use crate::error::{IntoHttpResponse, WfeError};

/// Type tag of a problem document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemType {
    Malformed,
    Unauthorized,
    ServerInternal,
}

impl ProblemType {
    #[must_use]
    pub const fn urn(self) -> &'static str {
        match self {
            Self::Malformed => "urn:acme:error:malformed",
            Self::Unauthorized => "urn:acme:error:unauthorized",
            Self::ServerInternal => "urn:acme:error:serverInternal",
        }
    }
}

/// Structured error body returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub problem_type: &'static str,
    pub detail: String,
}

const FALLBACK_PROBLEM: &str = r#"{"detail":"Problem marshalling error message."}"#;

/// Render a handler failure as a problem response.
///
/// Only server-internal problems reach the audit log. Everything a client can
/// provoke on purpose stays at debug level so the audit channel cannot be
/// flooded from outside.
#[must_use]
pub fn to_error_response(report: &Report<WfeError>) -> Response<Bytes> {
    let err = report.current_context();
    let problem_type = err.kind.problem_type();
    let problem = ProblemDocument {
        problem_type: problem_type.urn(),
        detail: err.user_message(),
    };

    if problem_type == ProblemType::ServerInternal {
        log::error!(target: AUDIT_TARGET, "Internal error - {} - {:?}", problem.detail, report);
    } else {
        log::debug!("Request failed ({}): {:?}", err.kind, report);
    }

    let body = match serde_json::to_vec(&problem) {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            log::error!(
                target: AUDIT_TARGET,
                "Could not marshal error message: {} - {:?}",
                e,
                problem
            );
            Bytes::from_static(FALLBACK_PROBLEM.as_bytes())
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = err.status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE_PROBLEM),
    );
    if let Some(allow) = err.allow {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static(allow));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use http::StatusCode;
    use serde_json::Value;
    use std::sync::{Mutex, Once};

    /// Keeps every record so tests can see which target it went to.
    struct CapturingLogger;

    static CAPTURED: Mutex<Vec<(String, log::Level, String)>> = Mutex::new(Vec::new());
    static INSTALL: Once = Once::new();

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            CAPTURED.lock().expect("capture lock").push((
                record.target().to_string(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    fn captured_with(marker: &str) -> Vec<(String, log::Level)> {
        INSTALL.call_once(|| {
            log::set_logger(&CapturingLogger).expect("no other logger in tests");
            log::set_max_level(log::LevelFilter::Trace);
        });
        CAPTURED
            .lock()
            .expect("capture lock")
            .iter()
            .filter(|(_, _, message)| message.contains(marker))
            .map(|(target, level, _)| (target.clone(), *level))
            .collect()
    }

    fn body_json(response: &Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).expect("should be a JSON body")
    }

    #[test]
    fn forbidden_renders_unauthorized_problem() {
        let report = Report::new(WfeError::unauthorized("Request signing key did not match"));
        let response = to_error_response(&report);

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            CONTENT_TYPE_PROBLEM
        );
        let body = body_json(&response);
        assert_eq!(body["type"], "urn:acme:error:unauthorized");
        assert_eq!(body["detail"], "Request signing key did not match");
    }

    #[test]
    fn client_errors_render_malformed_problem() {
        for kind in [
            ErrorKind::Malformed,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::MethodNotAllowed,
        ] {
            let response = to_error_response(&Report::new(WfeError::new(kind, "nope")));
            assert_eq!(body_json(&response)["type"], "urn:acme:error:malformed");
        }
    }

    #[test]
    fn internal_error_hides_attachments_from_client() {
        let report = Report::new(WfeError::internal("Error marshaling registration"))
            .attach("database password is hunter2");
        let response = to_error_response(&report);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(&response);
        assert_eq!(body["type"], "urn:acme:error:serverInternal");
        assert_eq!(body["detail"], "Error marshaling registration");
        let raw = String::from_utf8_lossy(response.body());
        assert!(!raw.contains("hunter2"));
    }

    #[test]
    fn only_internal_errors_reach_audit_log() {
        // Install before logging so the records below are kept.
        captured_with("");

        let malformed = Report::new(WfeError::malformed("Unable to read request body"))
            .attach("marker-client-7f3a");
        let _ = to_error_response(&malformed);
        let records = captured_with("marker-client-7f3a");
        assert!(!records.is_empty(), "client error is still logged");
        assert!(records.iter().all(|(target, _)| target != AUDIT_TARGET));
        assert!(records.iter().all(|(_, level)| *level == log::Level::Debug));

        let internal = Report::new(WfeError::internal("Unable to load certificate"))
            .attach("marker-internal-91c2");
        let _ = to_error_response(&internal);
        let records = captured_with("marker-internal-91c2");
        assert!(records
            .iter()
            .any(|(target, level)| target == AUDIT_TARGET && *level == log::Level::Error));
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = to_error_response(&Report::new(WfeError::method_not_allowed("POST")));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(header::ALLOW).expect("allow header"),
            "POST"
        );
    }
}
