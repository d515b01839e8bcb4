//! Anti-replay nonces.
//!
//! Every response hands the client a fresh token; every signed request must
//! spend one. The registry is the only mutable state shared between request
//! tasks, so all access goes through [`NonceService`].

use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose, Engine};
use dashmap::DashMap;
use rand::RngCore;

const RANDOM_BYTES: usize = 16;
const TOKEN_BYTES: usize = RANDOM_BYTES + 8;
/// Encoded length of a token: 24 bytes base64url without padding.
pub const TOKEN_LENGTH: usize = 32;

/// Issue and single-use validation of anti-replay tokens.
pub trait NonceService: Send + Sync {
    /// Mint a token that has never been issued before and record it as valid.
    fn issue(&self) -> String;

    /// Spend `token`. Returns `true` exactly once for each issued token.
    fn consume(&self, token: &str) -> bool;
}

/// In-memory registry of outstanding nonces.
///
/// Tokens are 16 random bytes followed by the big-endian issue sequence.
/// Memory stays bounded by sweeping anything older than the newest
/// `capacity` issuances.
#[derive(Debug)]
pub struct NonceRegistry {
    outstanding: DashMap<[u8; TOKEN_BYTES], u64>,
    sequence: AtomicU64,
    capacity: u64,
    sweep_interval: u64,
}

impl NonceRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = u64::try_from(capacity).unwrap_or(u64::MAX).max(1);
        Self {
            outstanding: DashMap::new(),
            sequence: AtomicU64::new(0),
            capacity,
            sweep_interval: (capacity / 4).max(1),
        }
    }

    /// Number of tokens currently redeemable.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    fn decode(token: &str) -> Option<[u8; TOKEN_BYTES]> {
        if token.len() != TOKEN_LENGTH {
            return None;
        }
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(token).ok()?;
        bytes.try_into().ok()
    }

    fn sweep(&self, newest: u64) {
        let before = self.outstanding.len();
        let capacity = self.capacity;
        self.outstanding
            .retain(|_, issued| issued.saturating_add(capacity) > newest);
        let swept = before.saturating_sub(self.outstanding.len());
        if swept > 0 {
            log::debug!("Swept {} stale nonces", swept);
        }
    }
}

impl NonceService for NonceRegistry {
    fn issue(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes[..RANDOM_BYTES]);
        bytes[RANDOM_BYTES..].copy_from_slice(&sequence.to_be_bytes());

        self.outstanding.insert(bytes, sequence);
        if sequence % self.sweep_interval == 0 && sequence >= self.capacity {
            self.sweep(sequence);
        }

        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    fn consume(&self, token: &str) -> bool {
        let Some(key) = Self::decode(token) else {
            log::debug!("Rejecting malformed nonce");
            return false;
        };
        self.outstanding.remove(&key).is_some()
    }
}
