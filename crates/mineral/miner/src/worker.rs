//! Nonce search
//!
//! Walks nonces from a starting point until the proof hash has enough
//! leading zero bytes.

use crate::{
    ledger::AccountAddress,
    proof::{Difficulty, Proof, build_proof, meets_difficulty},
};
use alloy_primitives::B256;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Nonce search errors
#[derive(Debug, thiserror::Error)]
pub enum MiningError {
    /// No solution found within the time limit
    #[error("No solution found in nonce range {start}..{end}")]
    NoSolution {
        /// First nonce tried
        start: u64,
        /// Next nonce that would have been tried
        end: u64,
    },

    /// Search was cancelled
    #[error("Mining cancelled")]
    Cancelled,

    /// The search task panicked or was torn down with the runtime
    #[error("Mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Search configuration
#[derive(Debug, Clone)]
pub struct MiningConfig {
    /// Nonces to try per batch before checking for cancellation
    pub batch_size: u64,
    /// Maximum time to search before giving up (None = forever)
    pub max_duration: Option<Duration>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self { batch_size: 10_000, max_duration: None }
    }
}

/// Inputs of one search
#[derive(Debug, Clone, Copy)]
pub struct MineJob {
    /// Hash currently recorded on the miner
    pub current_hash: B256,
    /// Signer address mixed into the proof
    pub signer: AccountAddress,
    /// Required leading zero bytes
    pub difficulty: Difficulty,
    /// First nonce to try, random when `None`
    pub initial_nonce: Option<u64>,
}

/// Result of a successful search
#[derive(Debug, Clone, Copy)]
pub struct MineResult {
    /// Hash the proof was built on
    pub current_hash: B256,
    /// The winning proof
    pub proof: Proof,
    /// Number of hashes computed
    pub hashes_computed: u64,
    /// Time taken to find the solution
    pub duration: Duration,
}

impl MineResult {
    /// Hashrate in H/s
    pub fn hashrate(&self) -> f64 {
        self.hashes_computed as f64 / self.duration.as_secs_f64().max(f64::EPSILON)
    }
}

/// Worker that searches for valid nonces
#[derive(Debug, Clone)]
pub struct MiningWorker {
    config: MiningConfig,
    cancelled: Arc<AtomicBool>,
    total_hashes: Arc<AtomicU64>,
}

impl MiningWorker {
    /// Create a new worker
    pub fn new(config: MiningConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            total_hashes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancel an ongoing search
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reset cancellation flag and counters
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.total_hashes.store(0, Ordering::SeqCst);
    }

    /// Hashes computed since the last reset
    pub fn hash_count(&self) -> u64 {
        self.total_hashes.load(Ordering::Relaxed)
    }

    /// Search for a nonce (blocking)
    pub fn mine(&self, job: &MineJob) -> Result<MineResult, MiningError> {
        let start = Instant::now();
        let mut nonce = job.initial_nonce.unwrap_or_else(rand::random);
        let start_nonce = nonce;

        debug!(
            target: "mineral::worker",
            current_hash = %job.current_hash,
            difficulty = %job.difficulty,
            start_nonce,
            "Starting nonce search"
        );

        loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(MiningError::Cancelled);
            }

            if let Some(max_dur) = self.config.max_duration {
                if start.elapsed() > max_dur {
                    return Err(MiningError::NoSolution { start: start_nonce, end: nonce });
                }
            }

            for _ in 0..self.config.batch_size {
                let hash = build_proof(&job.current_hash, &job.signer, nonce);
                self.total_hashes.fetch_add(1, Ordering::Relaxed);

                if meets_difficulty(&hash, job.difficulty) {
                    let duration = start.elapsed();
                    let result = MineResult {
                        current_hash: job.current_hash,
                        proof: Proof { nonce, hash },
                        hashes_computed: self.hash_count(),
                        duration,
                    };

                    info!(
                        target: "mineral::worker",
                        nonce,
                        hash = %hash,
                        hashes = result.hashes_computed,
                        duration_ms = duration.as_millis(),
                        hashrate = format!("{:.2} H/s", result.hashrate()),
                        "Proof found"
                    );
                    return Ok(result);
                }

                nonce = nonce.wrapping_add(1);
            }
        }
    }

    /// Run [`Self::mine`] on the blocking pool
    pub async fn mine_async(&self, job: MineJob) -> Result<MineResult, MiningError> {
        let worker = self.clone();
        tokio::task::spawn_blocking(move || worker.mine(&job)).await?
    }
}
