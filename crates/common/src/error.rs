//! Error types and the status-code mapping for the web front end.
//!
//! Every failure a handler can produce is a [`WfeError`] whose [`ErrorKind`]
//! is drawn from a closed set. [`ErrorKind::status_code`] and
//! [`ErrorKind::problem_type`] are the only place a kind is turned into wire
//! semantics; handlers never pick status codes themselves.

use derive_more::Display;
use http::StatusCode;

use crate::problem::ProblemType;

/// Closed set of request failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// Malformed or unparseable client input.
    #[display("malformed")]
    Malformed,
    /// Syntactic protocol violation.
    #[display("syntax")]
    Syntax,
    /// The operation is not supported.
    #[display("not supported")]
    NotSupported,
    /// Unauthorized signer or access-control mismatch.
    #[display("unauthorized")]
    Unauthorized,
    /// Unknown resource.
    #[display("not found")]
    NotFound,
    /// HTTP method outside the endpoint's whitelist.
    #[display("method not allowed")]
    MethodNotAllowed,
    /// The request conflicts with existing state.
    #[display("conflict")]
    Conflict,
    /// A signature failed validation.
    #[display("signature validation")]
    SignatureValidation,
    /// Any uncategorized internal fault.
    #[display("internal")]
    Internal,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Malformed,
        ErrorKind::Syntax,
        ErrorKind::NotSupported,
        ErrorKind::Unauthorized,
        ErrorKind::NotFound,
        ErrorKind::MethodNotAllowed,
        ErrorKind::Conflict,
        ErrorKind::SignatureValidation,
        ErrorKind::Internal,
    ];

    /// HTTP status sent to the client for this kind.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Malformed | Self::Syntax => StatusCode::BAD_REQUEST,
            Self::NotSupported => StatusCode::NOT_IMPLEMENTED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::SignatureValidation => StatusCode::PRECONDITION_FAILED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Problem document type, chosen by status family.
    #[must_use]
    pub const fn problem_type(self) -> ProblemType {
        match self {
            Self::Unauthorized => ProblemType::Unauthorized,
            Self::Malformed
            | Self::Syntax
            | Self::NotFound
            | Self::MethodNotAllowed
            | Self::Conflict
            | Self::SignatureValidation => ProblemType::Malformed,
            Self::NotSupported | Self::Internal => ProblemType::ServerInternal,
        }
    }
}

/// Handler-level error context.
///
/// `detail` is the only text a client ever sees. Anything diagnostic belongs
/// in the surrounding [`error_stack::Report`] as an attachment or a source
/// context.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{kind}: {detail}")]
pub struct WfeError {
    pub kind: ErrorKind,
    pub detail: String,
    /// Value of the `Allow` header for method-not-allowed responses.
    pub allow: Option<&'static str>,
}

impl core::error::Error for WfeError {}

impl WfeError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            allow: None,
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    /// A 405 carrying the comma separated list of permitted methods.
    #[must_use]
    pub fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            kind: ErrorKind::MethodNotAllowed,
            detail: "Method not allowed".to_string(),
            allow: Some(allow),
        }
    }
}

/// Conversion of an error context into its HTTP representation.
pub trait IntoHttpResponse {
    /// Status code sent to the client.
    fn status_code(&self) -> StatusCode;

    /// Detail string safe to show to the client.
    fn user_message(&self) -> String;
}

impl IntoHttpResponse for WfeError {
    fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    fn user_message(&self) -> String {
        self.detail.clone()
    }
}

/// Failures while loading settings or wiring the service at startup.
#[derive(Debug, Display)]
#[display("Configuration error: {message}")]
pub struct ConfigurationError {
    pub message: String,
}

impl core::error::Error for ConfigurationError {}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
