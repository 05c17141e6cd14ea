//! Ledger collaborators and the read snapshots they return.
//!
//! The miner never talks to the network directly. Reads, dry runs and
//! submissions go through [`Ledger`], signatures through
//! [`TransactionSigner`].

use alloy_primitives::{B256, b256};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{bus::Bus, tx::TransactionDraft};

/// Ledger object identifier
pub type ObjectId = B256;

/// Account address of a signer
pub type AccountAddress = B256;

/// Shared clock object every mine call takes as an argument
pub const CLOCK_OBJECT_ID: ObjectId =
    b256!("0x0000000000000000000000000000000000000000000000000000000000000006");

/// Ledger access errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport or JSON-RPC level failure
    #[error("RPC error: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    /// Object does not exist or has no content
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Object content did not have the expected shape
    #[error("failed to decode object {id}: {reason}")]
    Decode {
        /// Object that failed to decode
        id: ObjectId,
        /// Decoder message
        reason: String,
    },

    /// Submission response carried no effects
    #[error("Tx effects missing")]
    MissingEffects,

    /// Signing collaborator failed
    #[error("signer error: {0}")]
    Signer(String),
}

/// On-chain miner record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinerRecord {
    /// Miner object id
    pub id: ObjectId,
    /// Last proof hash accepted by the contract
    pub current_hash: B256,
}

/// Execution status reported in transaction effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Transaction executed
    Success,
    /// Transaction aborted
    Failure {
        /// Raw abort message, embeds the contract error code
        #[serde(default)]
        error: Option<String>,
    },
}

/// Gas charged by an execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCostSummary {
    /// Computation cost
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub computation_cost: u64,
    /// Storage cost
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub storage_cost: u64,
    /// Storage rebate
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub storage_rebate: u64,
}

impl GasCostSummary {
    /// `computation + storage - rebate`, floored at zero
    pub const fn net_cost(&self) -> u64 {
        self.computation_cost.saturating_add(self.storage_cost).saturating_sub(self.storage_rebate)
    }
}

/// Effects of a dry run or an executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEffects {
    /// Execution status
    pub status: ExecutionStatus,
    /// Gas charged
    pub gas_used: GasCostSummary,
    /// Transaction digest
    pub transaction_digest: String,
}

impl TransactionEffects {
    /// Failure message, `None` on success
    pub fn failure(&self) -> Option<String> {
        match &self.status {
            ExecutionStatus::Success => None,
            ExecutionStatus::Failure { error: Some(error) } => Some(error.clone()),
            ExecutionStatus::Failure { error: None } => {
                Some(format!("Unknown failure: {}", self.transaction_digest))
            }
        }
    }
}

/// Signed transaction bytes as produced by the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// Base64 transaction bytes
    pub tx_bytes: String,
    /// Base64 serialized signature
    pub signature: String,
}

/// Read and write access to the ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch several buses in one batched read, in the order of `ids`
    async fn multi_get_buses(&self, ids: &[ObjectId]) -> Result<Vec<Bus>, LedgerError>;

    /// Fetch a single bus
    async fn get_bus(&self, id: ObjectId) -> Result<Bus, LedgerError>;

    /// Fetch a miner record
    async fn get_miner(&self, id: ObjectId) -> Result<MinerRecord, LedgerError>;

    /// Find the miner object owned by `owner`, if any
    async fn find_miner(&self, owner: AccountAddress) -> Result<Option<ObjectId>, LedgerError>;

    /// Execute a transaction without committing it
    async fn dry_run(&self, tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError>;

    /// Submit a transaction and wait for its effects
    async fn execute(&self, tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError>;
}

/// Produces signed transaction bytes for drafts
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address transactions are sent from
    fn address(&self) -> AccountAddress;

    /// Sign `draft`. `None` leaves the gas budget to the signer.
    async fn sign(
        &self,
        draft: &TransactionDraft,
        gas_budget: Option<u64>,
    ) -> Result<SignedTransaction, LedgerError>;
}

/// Accepts `"123"` as well as `123`
pub(crate) fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
