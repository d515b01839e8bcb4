//! The registration and issuance authority the front end delegates to.

use async_trait::async_trait;
use derive_more::Display;
use error_stack::Report;

use crate::cert::ParsedCertificate;
use crate::error::ErrorKind;
use crate::models::{
    Account, AccountId, AccountUpdate, Authorization, Certificate, CertificateRequest,
    ChallengeResponse, NewAccount, NewAuthorization,
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum AuthorityError {
    #[display("Malformed request: {_0}")]
    Malformed(String),
    #[display("Syntax error: {_0}")]
    Syntax(String),
    #[display("Not supported: {_0}")]
    NotSupported(String),
    #[display("Unauthorized: {_0}")]
    Unauthorized(String),
    #[display("Not found: {_0}")]
    NotFound(String),
    #[display("Conflict: {_0}")]
    Conflict(String),
    #[display("Signature validation failed: {_0}")]
    SignatureValidation(String),
    #[display("Internal error: {_0}")]
    Internal(String),
}

impl core::error::Error for AuthorityError {}

impl AuthorityError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::Syntax(_) => ErrorKind::Syntax,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::SignatureValidation(_) => ErrorKind::SignatureValidation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Business decisions behind every mutating ACME request.
///
/// Implementations own persistence and their own consistency. The front end
/// makes at most one mutating call per request and never retries.
#[async_trait]
pub trait Authority: Send + Sync {
    async fn create_account(&self, draft: NewAccount) -> Result<Account, Report<AuthorityError>>;

    /// Apply `update` to `current`. The key is never part of an update.
    async fn update_account(
        &self,
        current: &Account,
        update: AccountUpdate,
    ) -> Result<Account, Report<AuthorityError>>;

    async fn create_authorization(
        &self,
        draft: NewAuthorization,
        account_id: AccountId,
    ) -> Result<Authorization, Report<AuthorityError>>;

    /// Record `response` against the challenge at `challenge_index`. The
    /// returned authorization keeps the challenge at the same index.
    async fn update_authorization(
        &self,
        authorization: &Authorization,
        challenge_index: usize,
        response: ChallengeResponse,
    ) -> Result<Authorization, Report<AuthorityError>>;

    async fn issue_certificate(
        &self,
        request: CertificateRequest,
        account_id: AccountId,
    ) -> Result<Certificate, Report<AuthorityError>>;

    async fn revoke_certificate(
        &self,
        certificate: &ParsedCertificate,
    ) -> Result<(), Report<AuthorityError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_its_kind() {
        let cases = [
            (AuthorityError::Malformed(String::new()), ErrorKind::Malformed),
            (AuthorityError::Syntax(String::new()), ErrorKind::Syntax),
            (AuthorityError::NotSupported(String::new()), ErrorKind::NotSupported),
            (AuthorityError::Unauthorized(String::new()), ErrorKind::Unauthorized),
            (AuthorityError::NotFound(String::new()), ErrorKind::NotFound),
            (AuthorityError::Conflict(String::new()), ErrorKind::Conflict),
            (
                AuthorityError::SignatureValidation(String::new()),
                ErrorKind::SignatureValidation,
            ),
            (AuthorityError::Internal(String::new()), ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }
}
