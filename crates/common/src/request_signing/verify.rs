//! Signed request verification.

use std::sync::Arc;

use derive_more::Display;
use error_stack::{Report, ResultExt};
use serde_json::Value;

use super::envelope;
use super::keys::AccountKey;
use crate::models::Account;
use crate::nonce::NonceService;
use crate::storage::{Storage, StorageError};

/// Every way verification can fail, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum VerificationError {
    #[display("Request body is missing")]
    BodyMissing,
    #[display("Request body is not a valid signed envelope")]
    MalformedEnvelope,
    #[display("Envelope carries more than one signature")]
    TooManySignatures,
    #[display("Envelope is not signed")]
    Unsigned,
    #[display("Signature does not verify against the embedded key")]
    SignatureInvalid,
    #[display("Protected header carries no nonce")]
    NonceMissing,
    #[display("Nonce is unknown or already used")]
    NonceInvalid,
    #[display("No account is bound to the signing key")]
    UnknownAccount,
    #[display("Account lookup failed")]
    AccountLookup,
}

impl core::error::Error for VerificationError {}

/// Output of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedRequest {
    /// Payload bytes, trustworthy only because the signature verified.
    pub payload: Vec<u8>,
    pub key: AccountKey,
    /// `None` when no account is bound to `key` and none was required.
    pub account: Option<Account>,
}

/// Authenticates request bodies and binds them to accounts.
#[derive(Clone)]
pub struct RequestVerifier {
    nonces: Arc<dyn NonceService>,
    storage: Arc<dyn Storage>,
}

impl RequestVerifier {
    pub fn new(nonces: Arc<dyn NonceService>, storage: Arc<dyn Storage>) -> Self {
        Self { nonces, storage }
    }

    /// Verify `body` and resolve the signer's account.
    ///
    /// A nonce is consumed only once the signature has verified, and it stays
    /// consumed whatever the account lookup returns.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`]. With
    /// `require_account` unset, an unknown key is not an error.
    pub async fn verify(
        &self,
        body: &[u8],
        require_account: bool,
    ) -> Result<VerifiedRequest, Report<VerificationError>> {
        if body.is_empty() {
            return Err(Report::new(VerificationError::BodyMissing));
        }

        let parsed = envelope::parse(body).change_context(VerificationError::MalformedEnvelope)?;
        let signature = match parsed.signatures.as_slice() {
            [] => return Err(Report::new(VerificationError::Unsigned)),
            [signature] => signature,
            _ => return Err(Report::new(VerificationError::TooManySignatures)),
        };

        let protected = signature
            .protected_header()
            .change_context(VerificationError::MalformedEnvelope)?;
        let alg = protected
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Report::new(VerificationError::MalformedEnvelope)
                    .attach("Protected header carries no alg")
            })?;
        let jwk = protected
            .get("jwk")
            .or_else(|| signature.header.as_ref().and_then(|h| h.get("jwk")))
            .ok_or_else(|| {
                Report::new(VerificationError::MalformedEnvelope).attach("No embedded JWK")
            })?;
        let key = AccountKey::from_json(jwk).change_context(VerificationError::MalformedEnvelope)?;

        key.verify(alg, &parsed.signing_input(signature), &signature.signature)
            .change_context(VerificationError::SignatureInvalid)?;

        let nonce = protected
            .get("nonce")
            .and_then(Value::as_str)
            .ok_or_else(|| Report::new(VerificationError::NonceMissing))?;
        if !self.nonces.consume(nonce) {
            return Err(Report::new(VerificationError::NonceInvalid));
        }

        let account = match self.storage.account_by_key(&key).await {
            Ok(account) => Some(account),
            Err(report) if *report.current_context() == StorageError::NotFound => {
                if require_account {
                    return Err(report.change_context(VerificationError::UnknownAccount));
                }
                None
            }
            Err(report) => {
                if require_account {
                    return Err(report.change_context(VerificationError::AccountLookup));
                }
                log::warn!("Account lookup failed for an optional account: {:?}", report);
                None
            }
        };

        Ok(VerifiedRequest {
            payload: parsed.payload,
            key,
            account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::models::NewAccount;
    use crate::nonce::NonceRegistry;
    use crate::test_support::tests::{FailingStorage, Serialization, TestSigner};

    struct Fixture {
        nonces: Arc<NonceRegistry>,
        storage: Arc<MemoryStorage>,
        verifier: RequestVerifier,
    }

    fn fixture() -> Fixture {
        let nonces = Arc::new(NonceRegistry::new(1024));
        let storage = Arc::new(MemoryStorage::new());
        let verifier = RequestVerifier::new(nonces.clone(), storage.clone());
        Fixture {
            nonces,
            storage,
            verifier,
        }
    }

    fn kind(report: &Report<VerificationError>) -> VerificationError {
        *report.current_context()
    }

    #[tokio::test]
    async fn verifies_every_serialization_and_key_type() {
        let fx = fixture();
        for signer in [TestSigner::ed25519(), TestSigner::p256(), TestSigner::rsa()] {
            for form in [
                Serialization::Flattened,
                Serialization::General,
                Serialization::Compact,
            ] {
                let body = signer.sign_as(form, br#"{"hello":"world"}"#, &fx.nonces.issue());
                let verified = fx
                    .verifier
                    .verify(&body, false)
                    .await
                    .expect("should verify");

                assert_eq!(verified.payload, br#"{"hello":"world"}"#);
                assert_eq!(verified.key, signer.account_key());
                assert!(verified.account.is_none());
            }
        }
    }

    #[tokio::test]
    async fn resolves_bound_account() {
        let fx = fixture();
        let signer = TestSigner::ed25519();
        let account = fx.storage.add_account(NewAccount {
            key: signer.account_key(),
            contact: vec![],
            agreement: None,
        })
        .expect("fresh key");

        let body = signer.sign(b"{}", &fx.nonces.issue());
        let verified = fx.verifier.verify(&body, true).await.expect("should verify");
        assert_eq!(verified.account, Some(account));
    }

    #[tokio::test]
    async fn empty_body_is_missing() {
        let fx = fixture();
        let err = fx.verifier.verify(b"", false).await.expect_err("should fail");
        assert_eq!(kind(&err), VerificationError::BodyMissing);
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let fx = fixture();
        let err = fx
            .verifier
            .verify(b"{\"not\":\"jws\"}", false)
            .await
            .expect_err("should fail");
        assert_eq!(kind(&err), VerificationError::MalformedEnvelope);
    }

    #[tokio::test]
    async fn signature_count_is_enforced() {
        let fx = fixture();
        let signer = TestSigner::ed25519();

        let unsigned = signer.unsigned(b"{}");
        let err = fx.verifier.verify(&unsigned, false).await.expect_err("unsigned");
        assert_eq!(kind(&err), VerificationError::Unsigned);

        let nonce = fx.nonces.issue();
        let doubled = signer.sign_twice(b"{}", &nonce);
        let err = fx.verifier.verify(&doubled, false).await.expect_err("two sigs");
        assert_eq!(kind(&err), VerificationError::TooManySignatures);
        assert!(fx.nonces.consume(&nonce), "nonce must not be spent");
    }

    #[tokio::test]
    async fn bad_signature_does_not_spend_nonce() {
        let fx = fixture();
        let signer = TestSigner::p256();
        let nonce = fx.nonces.issue();

        let body = signer.sign_tampered(b"{}", &nonce);
        let err = fx.verifier.verify(&body, false).await.expect_err("should fail");
        assert_eq!(kind(&err), VerificationError::SignatureInvalid);
        assert!(fx.nonces.consume(&nonce), "nonce must not be spent");
    }

    #[tokio::test]
    async fn nonce_is_required_and_single_use() {
        let fx = fixture();
        let signer = TestSigner::ed25519();

        let body = signer.sign_without_nonce(b"{}");
        let err = fx.verifier.verify(&body, false).await.expect_err("no nonce");
        assert_eq!(kind(&err), VerificationError::NonceMissing);

        let body = signer.sign(b"{}", &fx.nonces.issue());
        fx.verifier.verify(&body, false).await.expect("first use");
        let err = fx.verifier.verify(&body, false).await.expect_err("replay");
        assert_eq!(kind(&err), VerificationError::NonceInvalid);

        let body = signer.sign(b"{}", "never-issued");
        let err = fx.verifier.verify(&body, false).await.expect_err("unknown");
        assert_eq!(kind(&err), VerificationError::NonceInvalid);
    }

    #[tokio::test]
    async fn unknown_account_spends_nonce_when_required() {
        let fx = fixture();
        let signer = TestSigner::ed25519();
        let nonce = fx.nonces.issue();

        let body = signer.sign(b"{}", &nonce);
        let err = fx.verifier.verify(&body, true).await.expect_err("unknown");
        assert_eq!(kind(&err), VerificationError::UnknownAccount);
        assert!(!fx.nonces.consume(&nonce), "nonce stays spent");
    }

    #[tokio::test]
    async fn jwk_falls_back_to_unprotected_header() {
        let fx = fixture();
        let signer = TestSigner::ed25519();

        let body = signer.sign_with_unprotected_jwk(b"{}", &fx.nonces.issue());
        let verified = fx.verifier.verify(&body, false).await.expect("should verify");
        assert_eq!(verified.key, signer.account_key());
    }

    #[tokio::test]
    async fn storage_failure_fails_required_account_lookup() {
        let nonces = Arc::new(NonceRegistry::new(16));
        let verifier = RequestVerifier::new(nonces.clone(), Arc::new(FailingStorage));
        let signer = TestSigner::ed25519();

        let body = signer.sign(b"{}", &nonces.issue());
        let err = verifier.verify(&body, true).await.expect_err("lookup fails");
        assert_eq!(kind(&err), VerificationError::AccountLookup);
    }

    #[tokio::test]
    async fn storage_failure_leaves_optional_account_empty() {
        let nonces = Arc::new(NonceRegistry::new(16));
        let verifier = RequestVerifier::new(nonces.clone(), Arc::new(FailingStorage));
        let signer = TestSigner::p256();

        let body = signer.sign(b"{}", &nonces.issue());
        let verified = verifier.verify(&body, false).await.expect("should verify");
        assert!(verified.account.is_none());
        assert_eq!(verified.key, signer.account_key());
    }
}
