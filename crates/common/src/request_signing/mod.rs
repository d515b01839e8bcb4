//! Signed request handling.
//!
//! This module parses JWS request envelopes, checks their signatures against
//! the embedded account key, spends the anti-replay nonce and binds the
//! request to an account.

pub mod envelope;
pub mod keys;
pub mod verify;

pub use keys::{AccountKey, KeyError};
pub use verify::{RequestVerifier, VerificationError, VerifiedRequest};
