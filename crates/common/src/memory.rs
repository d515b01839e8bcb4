//! In-memory storage and authority for development and tests.
//!
//! Nothing here validates challenges. Any challenge response is accepted and
//! the authorization becomes valid immediately, so never expose this backend
//! to the internet.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use error_stack::{Report, ResultExt};
use rand::RngCore;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, SerialNumber};
use serde_json::Value;

use crate::authority::{Authority, AuthorityError};
use crate::cert::{self, ParsedCertificate};
use crate::error::ConfigurationError;
use crate::models::{
    Account, AccountId, AccountUpdate, Authorization, Certificate, CertificateRequest,
    CertificateStatus, Challenge, ChallengeResponse, NewAccount, NewAuthorization, Serial,
    ShortSerial, Status,
};
use crate::request_signing::AccountKey;
use crate::storage::{Storage, StorageError};

const CHALLENGE_TYPES: [&str; 2] = ["http-01", "dns-01"];
const RESERVED_CHALLENGE_FIELDS: [&str; 4] = ["type", "status", "uri", "token"];

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage over concurrent maps, indexed by key thumbprint, authorization id
/// and serial.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    last_account_id: AtomicI64,
    accounts: DashMap<String, Account>,
    authorizations: DashMap<String, Authorization>,
    certificates: DashMap<Serial, Certificate>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new account to `draft.key`. Returns `None` if the key is
    /// already bound.
    pub fn add_account(&self, draft: NewAccount) -> Option<Account> {
        match self.accounts.entry(draft.key.thumbprint()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let account = Account {
                    id: self.last_account_id.fetch_add(1, Ordering::SeqCst) + 1,
                    key: draft.key,
                    contact: draft.contact,
                    agreement: draft.agreement,
                };
                slot.insert(account.clone());
                Some(account)
            }
        }
    }

    /// Replace the account bound to `account.key`.
    pub fn put_account(&self, account: Account) {
        self.accounts.insert(account.key.thumbprint(), account);
    }

    pub fn put_authorization(&self, authorization: Authorization) {
        self.authorizations
            .insert(authorization.id.clone(), authorization);
    }

    pub fn put_certificate(&self, certificate: Certificate) {
        self.certificates
            .insert(certificate.serial.clone(), certificate);
    }

    /// Set the status of the certificate with exactly `serial`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] for an unknown serial.
    pub fn set_certificate_status(
        &self,
        serial: &Serial,
        status: CertificateStatus,
    ) -> Result<(), Report<StorageError>> {
        let mut certificate = self
            .certificates
            .get_mut(serial)
            .ok_or_else(|| Report::new(StorageError::NotFound))?;
        certificate.status = status;
        Ok(())
    }

    fn has_valid_authorization(&self, account_id: AccountId, name: &str) -> bool {
        self.authorizations.iter().any(|entry| {
            let authz = entry.value();
            authz.registration_id == account_id
                && authz.status == Status::Valid
                && authz.identifier.identifier_type == "dns"
                && authz.identifier.value == name
        })
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn account_by_key(&self, key: &AccountKey) -> Result<Account, Report<StorageError>> {
        self.accounts
            .get(&key.thumbprint())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Report::new(StorageError::NotFound))
    }

    async fn authorization(&self, id: &str) -> Result<Authorization, Report<StorageError>> {
        self.authorizations
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Report::new(StorageError::NotFound))
    }

    async fn certificate(&self, serial: &Serial) -> Result<Certificate, Report<StorageError>> {
        self.certificates
            .get(serial)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Report::new(StorageError::NotFound))
    }

    async fn certificate_by_short_serial(
        &self,
        short: &ShortSerial,
    ) -> Result<Certificate, Report<StorageError>> {
        let mut matches: Vec<Certificate> = self
            .certificates
            .iter()
            .filter(|entry| entry.value().serial.short().as_ref() == Some(short))
            .map(|entry| entry.value().clone())
            .collect();

        match matches.len() {
            0 => Err(Report::new(StorageError::NotFound)),
            1 => Ok(matches.remove(0)),
            n => Err(Report::new(StorageError::Ambiguous)
                .attach(format!("{} certificates share short serial {}", n, short))),
        }
    }
}

/// Authority that approves everything it structurally can.
pub struct MemoryAuthority {
    storage: Arc<MemoryStorage>,
    authz_base_url: String,
    certificate_sequence: AtomicU64,
}

impl MemoryAuthority {
    /// `authz_base_url` is the absolute authorization path prefix challenge
    /// URIs are built from.
    pub fn new(storage: Arc<MemoryStorage>, authz_base_url: impl Into<String>) -> Self {
        Self {
            storage,
            authz_base_url: authz_base_url.into(),
            certificate_sequence: AtomicU64::new(0),
        }
    }

    /// Eight byte sequence followed by eight random bytes.
    fn next_serial(&self) -> [u8; 16] {
        let sequence = self.certificate_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut serial = [0u8; 16];
        serial[..8].copy_from_slice(&sequence.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut serial[8..]);
        serial
    }
}

#[async_trait]
impl Authority for MemoryAuthority {
    async fn create_account(&self, draft: NewAccount) -> Result<Account, Report<AuthorityError>> {
        let account = self.storage.add_account(draft).ok_or_else(|| {
            Report::new(AuthorityError::Conflict(
                "Registration key is already in use".to_string(),
            ))
        })?;
        log::info!("Created registration {}", account.id);
        Ok(account)
    }

    async fn update_account(
        &self,
        current: &Account,
        update: AccountUpdate,
    ) -> Result<Account, Report<AuthorityError>> {
        let mut account = current.clone();
        if let Some(contact) = update.contact {
            account.contact = contact;
        }
        if let Some(agreement) = update.agreement.filter(|a| !a.is_empty()) {
            account.agreement = Some(agreement);
        }
        self.storage.put_account(account.clone());
        Ok(account)
    }

    async fn create_authorization(
        &self,
        draft: NewAuthorization,
        account_id: AccountId,
    ) -> Result<Authorization, Report<AuthorityError>> {
        let identifier = draft.identifier;
        if identifier.identifier_type != "dns" {
            return Err(Report::new(AuthorityError::Malformed(format!(
                "Invalid identifier type {}",
                identifier.identifier_type
            ))));
        }
        if identifier.value.is_empty() || identifier.value.contains('/') {
            return Err(Report::new(AuthorityError::Malformed(
                "Invalid identifier value".to_string(),
            )));
        }

        let id = random_token(16);
        let challenges = CHALLENGE_TYPES
            .iter()
            .enumerate()
            .map(|(index, challenge_type)| Challenge {
                challenge_type: (*challenge_type).to_string(),
                status: Status::Pending,
                uri: format!("{}{}?challenge={}", self.authz_base_url, id, index),
                token: Some(random_token(32)),
                material: serde_json::Map::new(),
            })
            .collect::<Vec<_>>();
        let combinations = (0..challenges.len()).map(|i| vec![i]).collect();

        let authorization = Authorization {
            id,
            identifier: crate::models::Identifier {
                identifier_type: identifier.identifier_type,
                value: identifier.value.to_ascii_lowercase(),
            },
            registration_id: account_id,
            status: Status::Pending,
            challenges,
            combinations,
        };
        self.storage.put_authorization(authorization.clone());
        Ok(authorization)
    }

    async fn update_authorization(
        &self,
        authorization: &Authorization,
        challenge_index: usize,
        response: ChallengeResponse,
    ) -> Result<Authorization, Report<AuthorityError>> {
        let mut updated = authorization.clone();
        let challenge = updated.challenges.get_mut(challenge_index).ok_or_else(|| {
            Report::new(AuthorityError::Malformed(format!(
                "Invalid challenge index {}",
                challenge_index
            )))
        })?;

        for (field, value) in response.0 {
            if !RESERVED_CHALLENGE_FIELDS.contains(&field.as_str()) && value != Value::Null {
                challenge.material.insert(field, value);
            }
        }
        challenge.status = Status::Valid;
        updated.status = Status::Valid;

        self.storage.put_authorization(updated.clone());
        Ok(updated)
    }

    async fn issue_certificate(
        &self,
        request: CertificateRequest,
        account_id: AccountId,
    ) -> Result<Certificate, Report<AuthorityError>> {
        let names = cert::requested_names(&request.csr).change_context(
            AuthorityError::Malformed("Invalid certificate request".to_string()),
        )?;
        if names.is_empty() {
            return Err(Report::new(AuthorityError::Malformed(
                "Certificate request names no identifiers".to_string(),
            )));
        }
        if let Some(name) = names
            .iter()
            .find(|name| !self.storage.has_valid_authorization(account_id, name))
        {
            return Err(Report::new(AuthorityError::Unauthorized(format!(
                "Key not authorized for name {}",
                name
            ))));
        }

        let internal = || AuthorityError::Internal("Failed to sign certificate".to_string());
        let mut params = CertificateParams::new(names).change_context_lazy(internal)?;
        params.serial_number = Some(SerialNumber::from_slice(&self.next_serial()));
        let key_pair = KeyPair::generate().change_context_lazy(internal)?;
        let signed = params.self_signed(&key_pair).change_context_lazy(internal)?;

        let parsed = ParsedCertificate::from_der(signed.der()).change_context_lazy(internal)?;
        let certificate = Certificate {
            der: parsed.der,
            serial: parsed.serial,
            registration_id: account_id,
            status: CertificateStatus::Good,
        };
        self.storage.put_certificate(certificate.clone());
        Ok(certificate)
    }

    async fn revoke_certificate(
        &self,
        certificate: &ParsedCertificate,
    ) -> Result<(), Report<AuthorityError>> {
        self.storage
            .set_certificate_status(&certificate.serial, CertificateStatus::Revoked)
            .change_context(AuthorityError::NotFound(
                "Unknown certificate serial".to_string(),
            ))
    }
}

/// Self-signed CA certificate served as the issuer when none is configured.
///
/// # Errors
///
/// Returns an error if key generation or signing fails.
pub fn development_issuer() -> Result<Vec<u8>, Report<ConfigurationError>> {
    let error = || ConfigurationError::new("Failed to create development issuer certificate");

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, "acme-wfe development issuer");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let key_pair = KeyPair::generate().change_context_lazy(error)?;
    let issuer = params.self_signed(&key_pair).change_context_lazy(error)?;
    Ok(issuer.der().to_vec())
}
