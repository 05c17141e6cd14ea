//! Mineral Mining Agent
//!
//! Client-side control loop that competes for on-chain reward buses with
//! proof-of-work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MINING ROUND                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  Bus Selection                                           │   │
//! │   │  • Richest bus only, funded and not about to reset       │   │
//! │   │  • Otherwise wait for the next epoch                     │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! │                              │                                  │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  Nonce Search                                            │   │
//! │   │  • keccak(current hash ‖ signer ‖ nonce)                 │   │
//! │   │  • Leading zero bytes ≥ difficulty                       │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! │                              │                                  │
//! │   ┌─────────────────────────────────────────────────────────┐   │
//! │   │  Submission                                              │   │
//! │   │  • Sign, submit, classify contract aborts                │   │
//! │   │  • Wait for the miner hash to change                     │   │
//! │   └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod account;
pub mod bus;
pub mod classify;
pub mod config;
pub mod events;
pub mod ledger;
pub mod proof;
pub mod round;
pub mod rpc;
pub mod schedule;
pub mod signer;
pub mod tx;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use bus::{Bus, BusSelection, BusSelector, Ineligible};
pub use classify::{ContractFailure, ErrorRegistry};
pub use config::{ConfigError, MinerConfig};
pub use events::{EventSink, MineEvent};
pub use ledger::{AccountAddress, Ledger, LedgerError, ObjectId, TransactionSigner};
pub use proof::{Difficulty, Proof, ProofError, build_proof, build_simulation_proof, meets_difficulty};
pub use round::{Miner, RoundOutcome, RunSummary};
pub use rpc::RpcLedger;
pub use schedule::{Clock, PollPolicy, RetryScheduler, ScheduleError, SystemClock};
pub use signer::RemoteSigner;
pub use tx::{TxError, TxSubmitter};
pub use worker::{MineJob, MineResult, MiningConfig, MiningError, MiningWorker};

use thiserror::Error;

/// Round-level errors
#[derive(Debug, Error)]
pub enum MinerError {
    /// Ledger read or transport failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Transaction failed
    #[error("Transaction error: {0}")]
    Tx(#[from] TxError),

    /// Expected ledger state change never happened
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Nonce search failed
    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),

    /// Registration executed but no miner object is visible
    #[error("Miner failed to register for {owner}")]
    RegistrationFailed {
        /// Signer address
        owner: AccountAddress,
    },

    /// Nothing to mine against
    #[error("No buses configured")]
    NoBuses,
}

impl MinerError {
    /// Whether restarting the round with fresh state may succeed.
    ///
    /// Only contract aborts with a registered error code qualify.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Tx(e) => e.is_retriable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_policy() {
        let known = ErrorRegistry::new().with("ENeedsReset", 3).classify("abort 3");
        assert!(MinerError::from(TxError::Execution(known.clone())).is_retriable());
        assert!(MinerError::from(TxError::Simulation(known)).is_retriable());

        let unknown = ContractFailure::Unrecognized("boom".into());
        assert!(!MinerError::from(TxError::Execution(unknown)).is_retriable());
        assert!(!MinerError::from(LedgerError::MissingEffects).is_retriable());
        assert!(!MinerError::RegistrationFailed { owner: AccountAddress::ZERO }.is_retriable());
        assert!(
            !MinerError::from(ScheduleError::HashUnchanged { miner: ObjectId::ZERO, attempts: 5 })
                .is_retriable()
        );
    }

    #[test]
    fn test_mining_error() {
        let err = MiningError::NoSolution { start: 0, end: 1000 };
        assert!(err.to_string().contains("No solution"));
    }
}
