//! Proof hash construction and difficulty checks
//!
//! A proof hash is `Keccak256(current_hash || signer || nonce_le)` over a
//! fixed 72 byte buffer:
//!
//! ```text
//! 0           32          64      72
//! ├───────────┼───────────┼───────┤
//! │ cur. hash │  signer   │ nonce │
//! └───────────┴───────────┴───────┘
//! ```

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::ledger::AccountAddress;

/// Length of the buffer fed to the hash function
pub const PROOF_INPUT_LEN: usize = 32 + 32 + 8;

/// Length of a proof digest in bytes
pub const HASH_LEN: usize = 32;

/// Proof construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// Difficulty asks for more zero bytes than a digest has
    #[error("difficulty {0} exceeds digest length of {HASH_LEN} bytes")]
    DifficultyTooHigh(usize),
}

/// Number of leading zero bytes a proof hash must have.
///
/// Always within `0..=HASH_LEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Difficulty(usize);

impl Difficulty {
    /// Difficulty that every hash satisfies
    pub const ZERO: Self = Self(0);

    /// Create a difficulty, rejecting values above the digest length
    pub const fn new(zero_bytes: usize) -> Result<Self, ProofError> {
        if zero_bytes > HASH_LEN {
            return Err(ProofError::DifficultyTooHigh(zero_bytes));
        }
        Ok(Self(zero_bytes))
    }

    /// Leading zero bytes required
    pub const fn zero_bytes(self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for Difficulty {
    type Error = ProofError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Difficulty> for usize {
    fn from(value: Difficulty) -> Self {
        value.0
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A nonce together with the hash it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proof {
    /// Nonce submitted on-chain
    pub nonce: u64,
    /// Resulting proof hash
    pub hash: B256,
}

/// Compute the proof hash for `(current_hash, signer, nonce)`
pub fn build_proof(current_hash: &B256, signer: &AccountAddress, nonce: u64) -> B256 {
    let mut input = [0u8; PROOF_INPUT_LEN];
    input[..32].copy_from_slice(current_hash.as_slice());
    input[32..64].copy_from_slice(signer.as_slice());
    input[64..].copy_from_slice(&nonce.to_le_bytes());
    B256::from_slice(&Keccak256::digest(input))
}

/// Proof hash with zeroed hash and signer fields.
///
/// Only good for shaping a dry-run payload, the contract never accepts it.
pub fn build_simulation_proof(nonce: u64) -> B256 {
    build_proof(&B256::ZERO, &AccountAddress::ZERO, nonce)
}

/// Whether the first `difficulty` bytes of `hash` are all zero
pub fn meets_difficulty(hash: &B256, difficulty: Difficulty) -> bool {
    hash[..difficulty.zero_bytes()].iter().all(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_difficulty_bounds() {
        assert!(Difficulty::new(0).is_ok());
        assert!(Difficulty::new(HASH_LEN).is_ok());
        assert_eq!(Difficulty::new(33), Err(ProofError::DifficultyTooHigh(33)));
    }

    #[test]
    fn test_zero_difficulty_always_met() {
        let hash = B256::repeat_byte(0xff);
        assert!(meets_difficulty(&hash, Difficulty::ZERO));
    }

    #[test]
    fn test_meets_difficulty_leading_zeros() {
        let mut bytes = [0xabu8; 32];
        bytes[0] = 0;
        bytes[1] = 0;
        let hash = B256::from(bytes);

        assert!(meets_difficulty(&hash, Difficulty::new(1).unwrap()));
        assert!(meets_difficulty(&hash, Difficulty::new(2).unwrap()));
        assert!(!meets_difficulty(&hash, Difficulty::new(3).unwrap()));
        assert!(meets_difficulty(&B256::ZERO, Difficulty::new(32).unwrap()));
    }

    #[test]
    fn test_build_proof_layout() {
        let current = B256::repeat_byte(1);
        let signer = AccountAddress::repeat_byte(2);
        let nonce = 0x0102_0304_0506_0708u64;

        let mut input = Vec::with_capacity(PROOF_INPUT_LEN);
        input.extend_from_slice(current.as_slice());
        input.extend_from_slice(signer.as_slice());
        input.extend_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        let expected = B256::from_slice(&Keccak256::digest(&input));

        assert_eq!(build_proof(&current, &signer, nonce), expected);
    }

    #[test]
    fn test_simulation_proof_zeroes_identity() {
        assert_eq!(
            build_simulation_proof(42),
            build_proof(&B256::ZERO, &AccountAddress::ZERO, 42)
        );
        assert_ne!(build_simulation_proof(42), build_simulation_proof(43));
    }

    #[test]
    fn test_difficulty_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Difficulty>("33").is_err());
        assert_eq!(serde_json::from_str::<Difficulty>("4").unwrap(), Difficulty::new(4).unwrap());
    }

    proptest! {
        #[test]
        fn prop_meets_difficulty_iff_prefix_zero(bytes in any::<[u8; 32]>(), zeros in 0usize..=32) {
            let hash = B256::from(bytes);
            let difficulty = Difficulty::new(zeros).unwrap();
            let expected = bytes[..zeros].iter().all(|b| *b == 0);
            prop_assert_eq!(meets_difficulty(&hash, difficulty), expected);
        }

        #[test]
        fn prop_build_proof_deterministic_and_sensitive(
            current in any::<[u8; 32]>(),
            signer in any::<[u8; 32]>(),
            nonce in any::<u64>(),
            flip in 0usize..PROOF_INPUT_LEN,
        ) {
            let current = B256::from(current);
            let signer = AccountAddress::from(signer);
            let hash = build_proof(&current, &signer, nonce);
            prop_assert_eq!(hash, build_proof(&current, &signer, nonce));

            let changed = match flip {
                0..32 => {
                    let mut c = current;
                    c[flip] ^= 1;
                    build_proof(&c, &signer, nonce)
                }
                32..64 => {
                    let mut s = signer;
                    s[flip - 32] ^= 1;
                    build_proof(&current, &s, nonce)
                }
                _ => build_proof(&current, &signer, nonce ^ (1u64 << (8 * (flip - 64)))),
            };
            prop_assert_ne!(hash, changed);
        }
    }
}
