//! Mining transactions: building, cost estimation and submission.
//!
//! A round moves through
//!
//! ```text
//! Built → Simulated → CostEstimated → Signed → Submitted → Confirmed | Rejected
//! ```
//!
//! The network charges for execution and wants the gas budget up front.
//! [`TxSubmitter::estimate_and_submit`] takes the budget from a dry run of the
//! same payload, [`TxSubmitter::launch`] uses a fixed protocol budget.
//!
//! Nothing here is idempotent. Resubmitting the same nonce after a wait gets
//! rejected as stale, derive a fresh proof instead.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    classify::{ContractFailure, ErrorRegistry},
    events::{EventSink, MineEvent},
    ledger::{
        AccountAddress, CLOCK_OBJECT_ID, Ledger, LedgerError, ObjectId, TransactionEffects,
        TransactionSigner,
    },
};

/// Move module holding the mine entry point
pub const MINE_MODULE: &str = "mine";

/// Move module holding miner registration
pub const MINER_MODULE: &str = "miner";

/// Transaction argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Argument {
    /// Pure `u64` value
    U64 {
        /// Value, stringified to survive JSON number limits
        value: String,
    },
    /// Shared object reference
    SharedObject {
        /// Object id
        id: ObjectId,
        /// Whether the call mutates the object
        mutable: bool,
    },
    /// Owned or immutable object reference
    Object {
        /// Object id
        id: ObjectId,
    },
    /// Result of an earlier command
    Result {
        /// Command index
        index: u16,
    },
}

impl Argument {
    /// Pure `u64`
    pub fn u64(value: u64) -> Self {
        Self::U64 { value: value.to_string() }
    }
}

/// A single command of a programmable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    /// Call a Move function
    MoveCall {
        /// Package id
        package: ObjectId,
        /// Module name
        module: String,
        /// Function name
        function: String,
        /// Call arguments
        arguments: Vec<Argument>,
    },
    /// Merge coins into `destination`
    MergeCoins {
        /// Coin that receives the balance
        destination: ObjectId,
        /// Coins to merge in
        sources: Vec<Argument>,
    },
    /// Transfer objects to an address
    TransferObjects {
        /// Objects to transfer
        objects: Vec<Argument>,
        /// Receiving address
        recipient: AccountAddress,
    },
}

/// Unsigned transaction. The signer fills in sender and gas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// Commands in execution order
    pub commands: Vec<Command>,
}

/// Parameters of a mine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MineCall {
    /// Proof nonce
    pub nonce: u64,
    /// Miner object
    pub miner: ObjectId,
    /// Bus to claim from
    pub bus: ObjectId,
    /// Paying address, receives the reward when no coin is given
    pub payer: AccountAddress,
    /// Existing coin to merge the reward into
    pub coin: Option<ObjectId>,
}

/// Build the mine transaction.
///
/// The minted coin is merged into `call.coin` when set, otherwise
/// transferred to the payer.
pub fn build_mine_transaction(package: ObjectId, call: &MineCall) -> TransactionDraft {
    let mine = Command::MoveCall {
        package,
        module: MINE_MODULE.to_owned(),
        function: "mine".to_owned(),
        arguments: vec![
            Argument::u64(call.nonce),
            Argument::SharedObject { id: call.bus, mutable: true },
            Argument::SharedObject { id: CLOCK_OBJECT_ID, mutable: false },
            Argument::Object { id: call.miner },
        ],
    };
    let minted = Argument::Result { index: 0 };
    let payout = match call.coin {
        Some(destination) => Command::MergeCoins { destination, sources: vec![minted] },
        None => Command::TransferObjects { objects: vec![minted], recipient: call.payer },
    };
    TransactionDraft { commands: vec![mine, payout] }
}

/// Build the miner registration transaction
pub fn build_register_transaction(package: ObjectId) -> TransactionDraft {
    TransactionDraft {
        commands: vec![Command::MoveCall {
            package,
            module: MINER_MODULE.to_owned(),
            function: "register".to_owned(),
            arguments: Vec::new(),
        }],
    }
}

/// Lifecycle phase of a submission, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    /// Draft built
    Built,
    /// Dry run finished
    Simulated,
    /// Gas budget derived from the dry run
    CostEstimated,
    /// Signed with the final budget
    Signed,
    /// Sent to the network
    Submitted,
    /// Executed successfully
    Confirmed,
    /// Executed and aborted
    Rejected,
}

/// Transaction failures
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// Dry run aborted, nothing was submitted
    #[error("simulation failed: {0}")]
    Simulation(ContractFailure),

    /// Submitted and charged, but the contract aborted
    #[error("execution failed: {0}")]
    Execution(ContractFailure),

    /// Transport or signing failure
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TxError {
    /// The contract failure, if the ledger reported one
    pub const fn contract_failure(&self) -> Option<&ContractFailure> {
        match self {
            Self::Simulation(failure) | Self::Execution(failure) => Some(failure),
            Self::Ledger(_) => None,
        }
    }

    /// Recognised contract failures are worth a fresh round
    pub fn is_retriable(&self) -> bool {
        self.contract_failure().is_some_and(ContractFailure::is_known)
    }
}

/// Signs, simulates and submits transactions
#[derive(Debug)]
pub struct TxSubmitter<'a, L: ?Sized, S: ?Sized> {
    ledger: &'a L,
    signer: &'a S,
    registry: &'a ErrorRegistry,
    events: &'a EventSink,
}

impl<'a, L, S> TxSubmitter<'a, L, S>
where
    L: Ledger + ?Sized,
    S: TransactionSigner + ?Sized,
{
    /// Create a submitter
    pub const fn new(
        ledger: &'a L,
        signer: &'a S,
        registry: &'a ErrorRegistry,
        events: &'a EventSink,
    ) -> Self {
        Self { ledger, signer, registry, events }
    }

    /// Dry run `draft`, then submit it with the simulated gas cost.
    ///
    /// A failing dry run returns [`TxError::Simulation`] without submitting.
    pub async fn estimate_and_submit(
        &self,
        draft: &TransactionDraft,
    ) -> Result<TransactionEffects, TxError> {
        debug!(target: "mineral::tx", phase = ?TxPhase::Built, commands = draft.commands.len());

        self.events.emit(MineEvent::Simulating);
        let dry = self.signer.sign(draft, None).await?;
        let simulated = self.ledger.dry_run(&dry).await?;
        if let Some(raw) = simulated.failure() {
            let failure = self.registry.classify(&raw);
            warn!(target: "mineral::tx", error = %failure, raw = %raw, "Simulation failed");
            return Err(TxError::Simulation(failure));
        }
        debug!(target: "mineral::tx", phase = ?TxPhase::Simulated, digest = %simulated.transaction_digest);

        let cost = simulated.gas_used.net_cost();
        debug!(target: "mineral::tx", phase = ?TxPhase::CostEstimated, gas_budget = cost);

        // A zero budget leaves the choice to the signer
        let budget = (cost > 0).then_some(cost);
        self.sign_and_execute(draft, budget).await
    }

    /// Submit `draft` with a fixed gas budget, skipping the dry run
    pub async fn launch(
        &self,
        draft: &TransactionDraft,
        gas_budget: u64,
    ) -> Result<TransactionEffects, TxError> {
        debug!(target: "mineral::tx", phase = ?TxPhase::Built, gas_budget);
        self.sign_and_execute(draft, Some(gas_budget)).await
    }

    async fn sign_and_execute(
        &self,
        draft: &TransactionDraft,
        gas_budget: Option<u64>,
    ) -> Result<TransactionEffects, TxError> {
        let signed = self.signer.sign(draft, gas_budget).await?;
        debug!(target: "mineral::tx", phase = ?TxPhase::Signed, ?gas_budget);

        self.events.emit(MineEvent::Submitting);
        let effects = self.ledger.execute(&signed).await?;
        debug!(target: "mineral::tx", phase = ?TxPhase::Submitted, digest = %effects.transaction_digest);

        if let Some(raw) = effects.failure() {
            let failure = self.registry.classify(&raw);
            warn!(
                target: "mineral::tx",
                phase = ?TxPhase::Rejected,
                digest = %effects.transaction_digest,
                error = %failure,
                "Transaction aborted"
            );
            return Err(TxError::Execution(failure));
        }

        info!(
            target: "mineral::tx",
            phase = ?TxPhase::Confirmed,
            digest = %effects.transaction_digest,
            gas = effects.gas_used.net_cost(),
            "Transaction executed"
        );
        Ok(effects)
    }
}
