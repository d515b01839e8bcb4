//! Account keys: JWK conversion, signature checks and thumbprints.

use base64::{engine::general_purpose, Engine};
use derive_more::Display;
use error_stack::{Report, ResultExt};
use jose_jwk::{EcCurves, Jwk, Key, Okp, OkpCurves, Parameters};
use p256::ecdsa::signature::Verifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const ED25519_KEY_BYTES: usize = 32;
const P256_COORDINATE_BYTES: usize = 32;

#[derive(Debug, Display)]
pub enum KeyError {
    #[display("Unsupported key type")]
    Unsupported,
    #[display("Invalid public key")]
    InvalidKey,
    #[display("Algorithm {_0} does not match the key type")]
    AlgorithmMismatch(String),
    #[display("Signature did not verify")]
    BadSignature,
}

impl core::error::Error for KeyError {}

/// A public key an account is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Jwk", into = "Jwk")]
pub enum AccountKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    Rsa(rsa::pkcs1v15::VerifyingKey<Sha256>),
}

impl AccountKey {
    /// Read a public key out of a JWK. Private components are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for key types other than Ed25519, P-256 and RSA, or
    /// for key material that does not describe a valid public key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, Report<KeyError>> {
        match &jwk.key {
            Key::Okp(okp) if okp.crv == OkpCurves::Ed25519 => {
                let x: &[u8] = &okp.x;
                let bytes: [u8; ED25519_KEY_BYTES] = x
                    .try_into()
                    .map_err(|_| Report::new(KeyError::InvalidKey))
                    .attach("Ed25519 public key must be 32 bytes")?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .change_context(KeyError::InvalidKey)?;
                Ok(Self::Ed25519(key))
            }
            Key::Ec(ec) if matches!(ec.crv, EcCurves::P256) => {
                let (x, y): (&[u8], &[u8]) = (&ec.x, &ec.y);
                if x.len() != P256_COORDINATE_BYTES || y.len() != P256_COORDINATE_BYTES {
                    return Err(Report::new(KeyError::InvalidKey)
                        .attach("P-256 coordinates must be 32 bytes each"));
                }
                let mut point = Vec::with_capacity(1 + 2 * P256_COORDINATE_BYTES);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                    .change_context(KeyError::InvalidKey)?;
                Ok(Self::P256(key))
            }
            Key::Rsa(rsa_key) => {
                let public = RsaPublicKey::new(
                    BigUint::from_bytes_be(&rsa_key.n),
                    BigUint::from_bytes_be(&rsa_key.e),
                )
                .change_context(KeyError::InvalidKey)?;
                Ok(Self::Rsa(rsa::pkcs1v15::VerifyingKey::new(public)))
            }
            _ => Err(Report::new(KeyError::Unsupported)),
        }
    }

    /// Parse a JWK given as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JWK or [`Self::from_jwk`] fails.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, Report<KeyError>> {
        let jwk: Jwk =
            serde_json::from_value(value.clone()).change_context(KeyError::Unsupported)?;
        Self::from_jwk(&jwk)
    }

    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        let key = match self {
            Self::Ed25519(key) => Key::Okp(Okp {
                crv: OkpCurves::Ed25519,
                x: key.as_bytes().to_vec().into(),
                d: None,
            }),
            Self::P256(key) => {
                let point = key.to_encoded_point(false);
                let bytes = point.as_bytes();
                Key::Ec(jose_jwk::Ec {
                    crv: EcCurves::P256,
                    x: bytes[1..=P256_COORDINATE_BYTES].to_vec().into(),
                    y: bytes[1 + P256_COORDINATE_BYTES..].to_vec().into(),
                    d: None,
                })
            }
            Self::Rsa(key) => {
                let public: &RsaPublicKey = key.as_ref();
                Key::Rsa(jose_jwk::Rsa {
                    n: public.n().to_bytes_be().into(),
                    e: public.e().to_bytes_be().into(),
                    prv: None,
                })
            }
        };
        Jwk {
            key,
            prm: Parameters::default(),
        }
    }

    /// JWS `alg` value this key verifies.
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => "EdDSA",
            Self::P256(_) => "ES256",
            Self::Rsa(_) => "RS256",
        }
    }

    /// Check `signature` over `input` using the JWS algorithm `alg`.
    ///
    /// # Errors
    ///
    /// Returns an error if `alg` does not belong to this key type, the
    /// signature is not well formed, or it does not verify.
    pub fn verify(&self, alg: &str, input: &[u8], signature: &[u8]) -> Result<(), Report<KeyError>> {
        if alg != self.algorithm() {
            return Err(Report::new(KeyError::AlgorithmMismatch(alg.to_string())));
        }
        match self {
            Self::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .change_context(KeyError::BadSignature)?;
                key.verify_strict(input, &signature)
                    .change_context(KeyError::BadSignature)
            }
            Self::P256(key) => {
                let signature = p256::ecdsa::Signature::from_slice(signature)
                    .change_context(KeyError::BadSignature)?;
                key.verify(input, &signature)
                    .change_context(KeyError::BadSignature)
            }
            Self::Rsa(key) => {
                let signature = rsa::pkcs1v15::Signature::try_from(signature)
                    .change_context(KeyError::BadSignature)?;
                key.verify(input, &signature)
                    .change_context(KeyError::BadSignature)
            }
        }
    }

    /// Raw public key bytes: 32 bytes for Ed25519, an uncompressed SEC1 point
    /// for P-256, the big-endian modulus for RSA.
    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.as_bytes().to_vec(),
            Self::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            Self::Rsa(key) => key.as_ref().n().to_bytes_be(),
        }
    }

    /// Whether this key is the subject key of a certificate, given the
    /// certificate's SubjectPublicKeyInfo key bits.
    #[must_use]
    pub fn matches_subject_key(&self, subject_key: &[u8]) -> bool {
        match self {
            Self::Ed25519(key) => key.as_bytes().as_slice() == subject_key,
            // Certificates may carry the point compressed.
            Self::P256(key) => p256::ecdsa::VerifyingKey::from_sec1_bytes(subject_key)
                .is_ok_and(|other| other.to_encoded_point(false) == key.to_encoded_point(false)),
            // RSA key bits are a PKCS#1 RSAPublicKey.
            Self::Rsa(key) => RsaPublicKey::from_pkcs1_der(subject_key)
                .is_ok_and(|other| &other == key.as_ref()),
        }
    }

    /// RFC 7638 JWK thumbprint, base64url encoded.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        let b64 = |bytes: &[u8]| general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        // Members in lexicographic order with no whitespace.
        let canonical = match self {
            Self::Ed25519(key) => format!(
                r#"{{"crv":"Ed25519","kty":"OKP","x":"{}"}}"#,
                b64(key.as_bytes())
            ),
            Self::P256(key) => {
                let point = key.to_encoded_point(false);
                let bytes = point.as_bytes();
                format!(
                    r#"{{"crv":"P-256","kty":"EC","x":"{}","y":"{}"}}"#,
                    b64(&bytes[1..=P256_COORDINATE_BYTES]),
                    b64(&bytes[1 + P256_COORDINATE_BYTES..])
                )
            }
            Self::Rsa(key) => {
                let public: &RsaPublicKey = key.as_ref();
                format!(
                    r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                    b64(&public.e().to_bytes_be()),
                    b64(&public.n().to_bytes_be())
                )
            }
        };
        b64(&Sha256::digest(canonical.as_bytes()))
    }
}

impl PartialEq for AccountKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ed25519(a), Self::Ed25519(b)) => a.as_bytes() == b.as_bytes(),
            (Self::P256(a), Self::P256(b)) => a == b,
            (Self::Rsa(a), Self::Rsa(b)) => {
                let (a, b): (&RsaPublicKey, &RsaPublicKey) = (a.as_ref(), b.as_ref());
                a == b
            }
            _ => false,
        }
    }
}

impl Eq for AccountKey {}

impl TryFrom<Jwk> for AccountKey {
    type Error = Report<KeyError>;

    fn try_from(jwk: Jwk) -> Result<Self, Self::Error> {
        Self::from_jwk(&jwk)
    }
}

impl From<AccountKey> for Jwk {
    fn from(key: AccountKey) -> Self {
        key.to_jwk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer as _;
    use rand::rngs::OsRng;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::signature::SignatureEncoding;

    fn ed25519_pair() -> (ed25519_dalek::SigningKey, AccountKey) {
        let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let key = AccountKey::Ed25519(signing.verifying_key());
        (signing, key)
    }

    fn p256_pair() -> (p256::ecdsa::SigningKey, AccountKey) {
        let signing = p256::ecdsa::SigningKey::random(&mut OsRng);
        let key = AccountKey::P256(*signing.verifying_key());
        (signing, key)
    }

    #[test]
    fn jwk_conversion_preserves_key() {
        for key in [ed25519_pair().1, p256_pair().1] {
            let jwk = key.to_jwk();
            let parsed = AccountKey::from_jwk(&jwk).expect("should parse own JWK");
            assert_eq!(parsed, key);
            assert_eq!(parsed.thumbprint(), key.thumbprint());
        }
    }

    #[test]
    fn ed25519_signature_verifies() {
        let (signing, key) = ed25519_pair();
        let signature = signing.sign(b"protected.payload").to_bytes();

        assert!(key.verify("EdDSA", b"protected.payload", &signature).is_ok());
        assert!(key.verify("EdDSA", b"protected.tampered", &signature).is_err());
        assert!(key.verify("ES256", b"protected.payload", &signature).is_err());
    }

    #[test]
    fn p256_signature_verifies() {
        let (signing, key) = p256_pair();
        let signature: p256::ecdsa::Signature = signing.sign(b"protected.payload");
        let raw = signature.to_bytes();

        assert!(key.verify("ES256", b"protected.payload", &raw).is_ok());
        assert!(key.verify("ES256", b"protected.tampered", &raw).is_err());
        assert!(key.verify("ES256", b"protected.payload", &raw[..10]).is_err());
    }

    fn rsa_pair() -> (rsa::pkcs1v15::SigningKey<Sha256>, AccountKey) {
        let private = rsa::RsaPrivateKey::new(&mut OsRng, 1024).expect("RSA key generation");
        let key = AccountKey::Rsa(rsa::pkcs1v15::VerifyingKey::new(private.to_public_key()));
        (rsa::pkcs1v15::SigningKey::new(private), key)
    }

    #[test]
    fn rsa_signature_verifies() {
        let (signing, key) = rsa_pair();
        let signature = signing.sign(b"protected.payload").to_vec();

        assert_eq!(key.algorithm(), "RS256");
        assert!(key.verify("RS256", b"protected.payload", &signature).is_ok());
        assert!(key.verify("RS256", b"protected.tampered", &signature).is_err());
        assert!(key.verify("ES256", b"protected.payload", &signature).is_err());

        let parsed = AccountKey::from_jwk(&key.to_jwk()).expect("should parse own JWK");
        assert_eq!(parsed, key);
        assert_eq!(parsed.thumbprint(), key.thumbprint());
    }

    #[test]
    fn thumbprint_matches_rfc_7638_example() {
        // RFC 7638 section 3.1.
        let value = serde_json::json!({
            "kty": "RSA",
            "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            "e": "AQAB"
        });
        let key = AccountKey::from_json(&value).expect("should parse RFC key");
        assert_eq!(
            key.thumbprint(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn unsupported_jwk_is_rejected() {
        let value = serde_json::json!({"kty": "oct", "k": "c2VjcmV0"});
        assert!(AccountKey::from_json(&value).is_err());

        let short = serde_json::json!({"kty": "OKP", "crv": "Ed25519", "x": "AAAA"});
        assert!(AccountKey::from_json(&short).is_err());
    }

    #[test]
    fn thumbprint_matches_rfc_8037_example() {
        // RFC 8037 appendix A.3.
        let value = serde_json::json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"
        });
        let key = AccountKey::from_json(&value).expect("should parse RFC key");
        assert_eq!(
            key.thumbprint(),
            "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k"
        );
    }

    #[test]
    fn serde_round_trips_through_jwk_json() {
        let (_, key) = p256_pair();
        let json = serde_json::to_value(&key).expect("should serialize key");
        assert_eq!(json["kty"], "EC");
        assert_eq!(json["crv"], "P-256");

        let parsed: AccountKey = serde_json::from_value(json).expect("should deserialize key");
        assert_eq!(parsed, key);
    }

    #[test]
    fn subject_key_match() {
        let (_, ed) = ed25519_pair();
        let (_, ec) = p256_pair();

        assert!(ed.matches_subject_key(&ed.public_key_bytes()));
        assert!(ec.matches_subject_key(&ec.public_key_bytes()));
        assert!(!ec.matches_subject_key(&ed.public_key_bytes()));
        assert!(!ed.matches_subject_key(&ec.public_key_bytes()));

        let (_, rsa_key) = rsa_pair();
        let AccountKey::Rsa(verifying) = &rsa_key else {
            panic!("rsa_pair yields an RSA key");
        };
        let public: &RsaPublicKey = verifying.as_ref();
        let spki_bits = public
            .to_pkcs1_der()
            .expect("PKCS#1 encoding")
            .as_bytes()
            .to_vec();
        assert!(rsa_key.matches_subject_key(&spki_bits));
        assert!(!ec.matches_subject_key(&spki_bits));
        assert!(!rsa_key.matches_subject_key(&ec.public_key_bytes()));
    }
}
