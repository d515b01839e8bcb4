use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::request_signing::AccountKey;

pub type AccountId = i64;

/// Hex digits in a short serial.
pub const SHORT_SERIAL_LENGTH: usize = 16;
const SERIAL_BYTES: usize = 16;
const SHORT_SERIAL_BYTES: usize = 8;

fn deserialize_b64url<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    use base64::{engine::general_purpose, Engine};

    let encoded = String::deserialize(deserializer)?;
    general_purpose::URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(serde::de::Error::custom)
}

/// A subscriber registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub key: AccountKey,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement: Option<String>,
}

impl Account {
    /// Whether the subscriber has accepted any version of the agreement.
    #[must_use]
    pub fn has_agreed(&self) -> bool {
        self.agreement.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Client supplied registration fields, for both creation and update.
///
/// A `key` member in the payload is ignored: the key always comes from the
/// verified signature.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub contact: Option<Vec<String>>,
    #[serde(default)]
    pub agreement: Option<String>,
}

/// Registration handed to the authority for creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub key: AccountKey,
    pub contact: Vec<String>,
    pub agreement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

/// One proof-of-control method within an authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: String,
    pub status: Status,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Type-specific validation material.
    #[serde(flatten)]
    pub material: Map<String, Value>,
}

/// Body a client posts to answer a challenge.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ChallengeResponse(pub Map<String, Value>);

/// An authorization, including the fields clients never see.
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    pub id: String,
    pub identifier: Identifier,
    pub registration_id: AccountId,
    pub status: Status,
    /// Fixed at creation. A challenge is addressed by its index here.
    pub challenges: Vec<Challenge>,
    pub combinations: Vec<Vec<usize>>,
}

/// Client view of an [`Authorization`], without id and owner.
#[derive(Debug, Serialize)]
pub struct AuthorizationView<'a> {
    pub identifier: &'a Identifier,
    pub status: Status,
    pub challenges: &'a [Challenge],
    pub combinations: &'a [Vec<usize>],
}

impl Authorization {
    #[must_use]
    pub fn public_view(&self) -> AuthorizationView<'_> {
        AuthorizationView {
            identifier: &self.identifier,
            status: self.status,
            challenges: &self.challenges,
            combinations: &self.combinations,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAuthorization {
    pub identifier: Identifier,
}

/// Request to issue a certificate.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateRequest {
    /// DER encoded PKCS#10 request.
    #[serde(deserialize_with = "deserialize_b64url")]
    pub csr: Vec<u8>,
    #[serde(default)]
    pub authorizations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevocationRequest {
    /// DER encoded certificate to revoke.
    #[serde(deserialize_with = "deserialize_b64url")]
    pub certificate: Vec<u8>,
}

/// Certificate serial number, big-endian without leading zero bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(Vec<u8>);

impl Serial {
    #[must_use]
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The serial shifted right by 64 bits, or `None` when the serial is
    /// wider than 128 bits and has no short form.
    #[must_use]
    pub fn short(&self) -> Option<ShortSerial> {
        if self.0.len() > SERIAL_BYTES {
            return None;
        }
        let mut padded = [0u8; SERIAL_BYTES];
        padded[SERIAL_BYTES - self.0.len()..].copy_from_slice(&self.0);
        Some(ShortSerial(hex::encode(&padded[..SHORT_SERIAL_BYTES])))
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0>32}", hex::encode(&self.0))
    }
}

/// Fixed width external certificate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortSerial(String);

impl ShortSerial {
    /// Accepts exactly sixteen lowercase hex digits.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == SHORT_SERIAL_LENGTH
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Good,
    Revoked,
}

/// An issued certificate as held by storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub der: Vec<u8>,
    pub serial: Serial,
    pub registration_id: AccountId,
    pub status: CertificateStatus,
}
