use http::header::HeaderName;

// ACME path segments, all relative to the configured base URL.
pub const INDEX_PATH: &str = "/";
pub const NEW_REG_PATH: &str = "/acme/new-reg";
pub const REG_PATH: &str = "/acme/reg/";
pub const NEW_AUTHZ_PATH: &str = "/acme/new-authz";
pub const AUTHZ_PATH: &str = "/acme/authz/";
pub const NEW_CERT_PATH: &str = "/acme/new-cert";
pub const CERT_PATH: &str = "/acme/cert/";
pub const REVOKE_CERT_PATH: &str = "/acme/revoke-cert";
pub const TERMS_PATH: &str = "/terms";
pub const ISSUER_PATH: &str = "/acme/issuer-cert";
pub const BUILD_ID_PATH: &str = "/build";

pub const HEADER_REPLAY_NONCE: HeaderName = HeaderName::from_static("replay-nonce");

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";
pub const CONTENT_TYPE_PKIX_CERT: &str = "application/pkix-cert";
pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

/// Log target for audit records.
pub const AUDIT_TARGET: &str = "audit";
