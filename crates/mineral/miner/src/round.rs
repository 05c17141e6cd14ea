//! The mining loop.
//!
//! One round:
//!
//! ```text
//! select bus ──none──► wait for epoch reset ──► done
//!     │
//!  eligible
//!     ▼
//! read miner hash ─► search nonce ─► re-check bus ─► submit ─► wait for new hash
//! ```
//!
//! Every snapshot is re-read after a suspension, other agents race for the
//! same buses and only ledger-observed state counts.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    MinerError,
    account::resolve_miner,
    bus::{Bus, BusSelection, BusSelector},
    config::MinerConfig,
    events::{EventSink, MineEvent},
    ledger::{Ledger, ObjectId, TransactionSigner},
    proof::Proof,
    schedule::{Clock, RetryScheduler},
    tx::{MineCall, TxSubmitter, build_mine_transaction},
    worker::{MineJob, MiningConfig, MiningWorker},
};

/// Result of a round that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A proof was accepted and the miner hash moved on
    Mined {
        /// Bus the reward came from
        bus: ObjectId,
        /// Submitted proof
        proof: Proof,
        /// Miner hash after the submission
        new_hash: alloy_primitives::B256,
    },
    /// No bus was eligible, waited for the next epoch
    Waited {
        /// Bus snapshot after the reset
        bus: Bus,
    },
}

/// Totals of a [`Miner::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds started
    pub rounds: u64,
    /// Rounds that landed a proof
    pub mined: u64,
    /// Rounds restarted after a retriable failure
    pub retries: u64,
}

/// Mining agent
#[derive(Debug)]
pub struct Miner<L, S, C> {
    ledger: Arc<L>,
    signer: Arc<S>,
    config: MinerConfig,
    selector: BusSelector,
    scheduler: RetryScheduler<C>,
    worker: MiningWorker,
    events: EventSink,
}

impl<L, S, C> Miner<L, S, C>
where
    L: Ledger,
    S: TransactionSigner,
    C: Clock,
{
    /// Create an agent
    pub fn new(ledger: Arc<L>, signer: Arc<S>, clock: C, config: MinerConfig) -> Self {
        let selector = BusSelector::new(config.epoch_length(), config.reset_buffer());
        let scheduler = RetryScheduler::new(
            clock,
            config.epoch_length(),
            config.epoch_poll(),
            config.hash_poll(),
        );
        Self {
            ledger,
            signer,
            config,
            selector,
            scheduler,
            worker: MiningWorker::new(MiningConfig::default()),
            events: EventSink::disabled(),
        }
    }

    /// Publish progress to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Use a custom nonce search worker
    pub fn with_worker(mut self, worker: MiningWorker) -> Self {
        self.worker = worker;
        self
    }

    /// The nonce search worker, e.g. to cancel a search
    pub const fn worker(&self) -> &MiningWorker {
        &self.worker
    }

    fn submitter(&self) -> TxSubmitter<'_, L, S> {
        TxSubmitter::new(&*self.ledger, &*self.signer, &self.config.error_codes, &self.events)
    }

    /// Find or register the signer's miner object
    pub async fn resolve_miner(&self) -> Result<ObjectId, MinerError> {
        resolve_miner(&self.submitter(), &*self.ledger, &*self.signer, self.config.package_id).await
    }

    async fn select(&self) -> Result<BusSelection, MinerError> {
        let clock = self.scheduler.clock();
        Ok(self.selector.select_eligible(&*self.ledger, &self.config.buses, clock).await?)
    }

    async fn wait_for_epoch(&self) -> Result<RoundOutcome, MinerError> {
        self.events.emit(MineEvent::Waiting);
        // Buses share one epoch, the first configured one is the reference
        let reference = self.config.buses.first().copied().ok_or(MinerError::NoBuses)?;
        let bus = self.scheduler.await_epoch_advance(&*self.ledger, reference).await?;
        self.events.emit(MineEvent::Resetting);
        Ok(RoundOutcome::Waited { bus })
    }

    /// Run a single round for `miner`
    pub async fn run_round(&self, miner: ObjectId) -> Result<RoundOutcome, MinerError> {
        let bus = match self.select().await? {
            BusSelection::Eligible(bus) => bus,
            BusSelection::NoneEligible(reason) => {
                info!(target: "mineral::round", ?reason, "No eligible bus");
                return self.wait_for_epoch().await;
            }
        };

        let record = self.ledger.get_miner(miner).await?;
        let job = MineJob {
            current_hash: record.current_hash,
            signer: self.signer.address(),
            difficulty: self.config.difficulty,
            initial_nonce: None,
        };
        self.worker.reset();
        let found = self.worker.mine_async(job).await?;

        // The search took time, the bus may be about to reset by now
        let bus = match self.select().await? {
            BusSelection::Eligible(fresh) => fresh,
            BusSelection::NoneEligible(reason) => {
                info!(target: "mineral::round", bus = %bus.id, ?reason, "Bus closed during search");
                return self.wait_for_epoch().await;
            }
        };

        let draft = build_mine_transaction(
            self.config.package_id,
            &MineCall {
                nonce: found.proof.nonce,
                miner,
                bus: bus.id,
                payer: self.signer.address(),
                coin: self.config.coin_object,
            },
        );
        self.submitter().launch(&draft, self.config.mine_gas_budget()).await?;
        self.events.emit(MineEvent::Success);

        let new_hash =
            self.scheduler.await_hash_change(&*self.ledger, miner, record.current_hash).await?;
        self.events.emit(MineEvent::Checkpoint);

        info!(
            target: "mineral::round",
            bus = %bus.id,
            nonce = found.proof.nonce,
            hash = %new_hash,
            "Proof accepted"
        );
        Ok(RoundOutcome::Mined { bus: bus.id, proof: found.proof, new_hash })
    }

    /// Mine until `max_rounds` rounds have run (`None` = forever).
    ///
    /// Retriable failures restart the round from fresh state, anything else
    /// stops the agent.
    pub async fn run(&self, max_rounds: Option<u64>) -> Result<RunSummary, MinerError> {
        let miner = self.resolve_miner().await?;
        info!(target: "mineral::round", %miner, signer = %self.signer.address(), "Mining");

        let mut summary = RunSummary::default();
        while max_rounds.is_none_or(|max| summary.rounds < max) {
            summary.rounds += 1;
            match self.run_round(miner).await {
                Ok(RoundOutcome::Mined { .. }) => summary.mined += 1,
                Ok(RoundOutcome::Waited { .. }) => {}
                Err(e) if e.is_retriable() => {
                    warn!(target: "mineral::round", round = summary.rounds, error = %e, "Retrying");
                    self.events.emit(MineEvent::Retrying);
                    summary.retries += 1;
                    self.scheduler.sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    error!(target: "mineral::round", round = summary.rounds, error = %e, "Round failed");
                    return Err(e);
                }
            }
        }

        info!(
            target: "mineral::round",
            rounds = summary.rounds,
            mined = summary.mined,
            retries = summary.retries,
            "Mining finished"
        );
        Ok(summary)
    }
}
