//! Provably fair commit/reveal primitives
//!
//! The server commits to `sha256(server_seed)` before play. Each wager's
//! result hash is `HMAC-SHA256(key = server_seed, msg = "client_seed:nonce")`.
//! Once the seed is revealed anyone can recompute both.

use crate::errors::EntropyError;
use crate::rng::RandomSource;
use hmac::digest::Key;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Seeds longer than the SHA-256 block are hashed, shorter ones zero padded
fn key_block(server_seed: &str) -> Key<HmacSha256> {
    let mut block = Key::<HmacSha256>::default();
    let seed = server_seed.as_bytes();
    if seed.len() > block.len() {
        let digest = Sha256::digest(seed);
        block[..digest.len()].copy_from_slice(&digest);
    } else {
        block[..seed.len()].copy_from_slice(seed);
    }
    block
}

/// Freshly generated server seed with its public commitment
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSeed {
    pub secret: String,
    pub hash: String,
}

impl std::fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSeed")
            .field("secret", &"<redacted>")
            .field("hash", &self.hash)
            .finish()
    }
}

pub struct ProvablyFairVerifier;

impl ProvablyFairVerifier {
    /// New hex-encoded secret of `len` random bytes, plus its SHA-256 hash
    pub fn generate_server_seed(rng: &dyn RandomSource, len: usize) -> Result<ServerSeed, EntropyError> {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes)?;
        let secret = hex::encode(bytes);
        let hash = Self::hash_seed(&secret);
        Ok(ServerSeed { secret, hash })
    }

    /// Hex SHA-256 of the seed string
    pub fn hash_seed(server_seed: &str) -> String {
        hex::encode(Sha256::digest(server_seed.as_bytes()))
    }

    /// Random client seed used until the player picks their own
    pub fn generate_client_seed(rng: &dyn RandomSource) -> Result<String, EntropyError> {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes)?;
        Ok(hex::encode(bytes))
    }

    pub fn generate_result(server_seed: &str, client_seed: &str, nonce: u64) -> String {
        let mut mac = <HmacSha256 as Mac>::new(&key_block(server_seed));
        mac.update(format!("{}:{}", client_seed, nonce).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// First 8 hex characters as a u32, reduced modulo `max`.
    /// Returns `None` for a malformed hash or `max == 0`.
    pub fn hash_to_number(hash: &str, max: u32) -> Option<u32> {
        if max == 0 {
            return None;
        }
        let prefix = hash.get(..8)?;
        let value = u32::from_str_radix(prefix, 16).ok()?;
        Some(value % max)
    }

    pub fn verify(server_seed: &str, client_seed: &str, nonce: u64, expected_hash: &str) -> bool {
        let computed = Self::generate_result(server_seed, client_seed, nonce);
        computed.eq_ignore_ascii_case(expected_hash)
    }

    /// Does a revealed seed match the hash published before play?
    pub fn commitment_matches(server_seed: &str, published_hash: &str) -> bool {
        Self::hash_seed(server_seed).eq_ignore_ascii_case(published_hash)
    }
}
