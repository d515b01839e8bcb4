//! JWS envelope parsing.
//!
//! Accepts the flattened JSON, general JSON and compact serialisations and
//! normalises them into an [`Envelope`]. Nothing here checks signatures.

use base64::{engine::general_purpose, Engine};
use derive_more::Display;
use error_stack::{Report, ResultExt};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Display)]
#[display("Malformed JWS envelope")]
pub struct EnvelopeError;

impl core::error::Error for EnvelopeError {}

/// One signature as it appeared on the wire.
#[derive(Debug, Clone)]
pub struct RawSignature {
    /// Base64url protected header exactly as sent; it is part of the
    /// signing input.
    pub protected_b64: String,
    pub header: Option<Map<String, Value>>,
    pub signature: Vec<u8>,
}

impl RawSignature {
    /// Decode the protected header into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is absent, not base64url, or not a
    /// JSON object.
    pub fn protected_header(&self) -> Result<Map<String, Value>, Report<EnvelopeError>> {
        if self.protected_b64.is_empty() {
            return Err(Report::new(EnvelopeError).attach("Protected header is missing"));
        }
        let raw = decode_b64url(&self.protected_b64).attach("Protected header")?;
        serde_json::from_slice(&raw)
            .change_context(EnvelopeError)
            .attach("Protected header is not a JSON object")
    }
}

/// A parsed envelope. Signature count is not checked here.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload_b64: String,
    pub payload: Vec<u8>,
    pub signatures: Vec<RawSignature>,
}

impl Envelope {
    /// JWS signing input for `signature`: `protected "." payload`.
    #[must_use]
    pub fn signing_input(&self, signature: &RawSignature) -> Vec<u8> {
        format!("{}.{}", signature.protected_b64, self.payload_b64).into_bytes()
    }
}

#[derive(Deserialize)]
struct JsonSignature {
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<Map<String, Value>>,
    signature: String,
}

#[derive(Deserialize)]
struct JsonEnvelope {
    payload: String,
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<Map<String, Value>>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    signatures: Option<Vec<JsonSignature>>,
}

fn decode_b64url(value: &str) -> Result<Vec<u8>, Report<EnvelopeError>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(value)
        .change_context(EnvelopeError)
}

fn raw_signature(
    protected: Option<String>,
    header: Option<Map<String, Value>>,
    signature: &str,
) -> Result<RawSignature, Report<EnvelopeError>> {
    Ok(RawSignature {
        protected_b64: protected.unwrap_or_default(),
        header,
        signature: decode_b64url(signature).attach("Signature")?,
    })
}

fn parse_json(body: &[u8]) -> Result<Envelope, Report<EnvelopeError>> {
    let envelope: JsonEnvelope = serde_json::from_slice(body)
        .change_context(EnvelopeError)
        .attach("Body is not a JWS JSON serialization")?;

    let signatures = match (envelope.signatures, envelope.signature) {
        (Some(_), Some(_)) => {
            return Err(Report::new(EnvelopeError)
                .attach("Both flattened and general signature members present"));
        }
        (Some(list), None) => list
            .into_iter()
            .map(|s| raw_signature(s.protected, s.header, &s.signature))
            .collect::<Result<Vec<_>, _>>()?,
        (None, Some(signature)) => {
            vec![raw_signature(envelope.protected, envelope.header, &signature)?]
        }
        (None, None) => Vec::new(),
    };

    Ok(Envelope {
        payload: decode_b64url(&envelope.payload).attach("Payload")?,
        payload_b64: envelope.payload,
        signatures,
    })
}

fn parse_compact(body: &str) -> Result<Envelope, Report<EnvelopeError>> {
    let parts: Vec<&str> = body.split('.').collect();
    let [protected, payload, signature] = parts.as_slice() else {
        return Err(Report::new(EnvelopeError).attach("Compact JWS must have three parts"));
    };

    let signatures = if signature.is_empty() {
        Vec::new()
    } else {
        vec![raw_signature(Some((*protected).to_string()), None, signature)?]
    };

    Ok(Envelope {
        payload: decode_b64url(payload).attach("Payload")?,
        payload_b64: (*payload).to_string(),
        signatures,
    })
}

/// Parse a request body as a JWS in any serialisation.
///
/// # Errors
///
/// Returns an error if the body is not a structurally valid JWS.
pub fn parse(body: &[u8]) -> Result<Envelope, Report<EnvelopeError>> {
    let text = std::str::from_utf8(body)
        .change_context(EnvelopeError)
        .attach("Body is not UTF-8")?
        .trim();

    if text.starts_with('{') {
        parse_json(text.as_bytes())
    } else {
        parse_compact(text)
    }
}
