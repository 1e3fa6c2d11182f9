//! Cryptographically secure random source
//!
//! Everything that decides an outcome (shuffles, roulette draws, server
//! seeds) pulls from a `RandomSource`. The production source is the
//! operating system CSPRNG; if it fails the error propagates and the
//! operation aborts. There is no weaker fallback.

use crate::errors::EntropyError;
use rand::rngs::OsRng;
use rand::RngCore;

pub trait RandomSource: Send + Sync {
    /// Fill `buf` with random bytes
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), EntropyError>;

    /// Uniform integer in `[min, max)`
    fn next_int(&self, min: u64, max: u64) -> Result<u64, EntropyError> {
        if min >= max {
            return Err(EntropyError::InvalidRange { min, max });
        }

        let range = max - min;
        // Largest multiple of `range` that fits; draws at or above it are
        // rejected so every residue is equally likely.
        let zone = u64::MAX - (u64::MAX % range);
        loop {
            let mut bytes = [0u8; 8];
            self.fill_bytes(&mut bytes)?;
            let value = u64::from_le_bytes(bytes);
            if value < zone {
                return Ok(min + value % range);
            }
        }
    }
}

/// Operating system entropy (`getrandom` under the hood)
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError::ShuffleSourceUnavailable(e.to_string()))
    }
}
