//! In-memory collaborators for tests

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    bus::Bus,
    ledger::{
        AccountAddress, ExecutionStatus, GasCostSummary, Ledger, LedgerError, MinerRecord,
        ObjectId, SignedTransaction, TransactionEffects, TransactionSigner,
    },
    schedule::Clock,
    tx::TransactionDraft,
};

/// Successful effects with the given gas figures
pub(crate) fn effects(computation: u64, storage: u64, rebate: u64) -> TransactionEffects {
    TransactionEffects {
        status: ExecutionStatus::Success,
        gas_used: GasCostSummary {
            computation_cost: computation,
            storage_cost: storage,
            storage_rebate: rebate,
        },
        transaction_digest: "digest".into(),
    }
}

/// Pops scripted values, repeating the last one forever
fn next<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
}

#[derive(Debug, Default)]
struct LedgerState {
    buses: HashMap<ObjectId, VecDeque<Bus>>,
    miner: VecDeque<MinerRecord>,
    miner_reads: usize,
    owned: HashMap<AccountAddress, ObjectId>,
    register_on_execute: Option<(AccountAddress, ObjectId)>,
    dry_runs: VecDeque<TransactionEffects>,
    executes: VecDeque<TransactionEffects>,
    executed: usize,
    fetch_delay: Option<(ManualClock, Duration)>,
}

/// Scripted ledger
#[derive(Debug, Default)]
pub(crate) struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn with<R>(&self, f: impl FnOnce(&mut LedgerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Fixed bus snapshot
    pub(crate) fn put_bus(&self, bus: Bus) {
        self.script_bus(vec![bus]);
    }

    /// Successive snapshots of one bus
    pub(crate) fn script_bus(&self, snapshots: Vec<Bus>) {
        let id = snapshots[0].id;
        self.with(|s| s.buses.insert(id, snapshots.into()));
    }

    /// Successive miner snapshots
    pub(crate) fn script_miner(&self, snapshots: Vec<MinerRecord>) {
        self.with(|s| s.miner = snapshots.into());
    }

    pub(crate) fn set_owned_miner(&self, owner: AccountAddress, miner: ObjectId) {
        self.with(|s| s.owned.insert(owner, miner));
    }

    /// Make the next execution create a miner for `owner`
    pub(crate) fn register_on_execute(&self, owner: AccountAddress, miner: ObjectId) {
        self.with(|s| s.register_on_execute = Some((owner, miner)));
    }

    /// Advance `clock` by `delay` on every batched bus fetch
    pub(crate) fn advance_on_fetch(&self, clock: &ManualClock, delay: Duration) {
        let clock = clock.clone();
        self.with(|s| s.fetch_delay = Some((clock, delay)));
    }

    pub(crate) fn push_dry_run(&self, effects: TransactionEffects) {
        self.with(|s| s.dry_runs.push_back(effects));
    }

    pub(crate) fn push_execute(&self, effects: TransactionEffects) {
        self.with(|s| s.executes.push_back(effects));
    }

    pub(crate) fn executed(&self) -> usize {
        self.with(|s| s.executed)
    }

    pub(crate) fn miner_reads(&self) -> usize {
        self.with(|s| s.miner_reads)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn multi_get_buses(&self, ids: &[ObjectId]) -> Result<Vec<Bus>, LedgerError> {
        let mut buses = Vec::with_capacity(ids.len());
        for id in ids {
            buses.push(self.get_bus(*id).await?);
        }
        if let Some((clock, delay)) = self.with(|s| s.fetch_delay.clone()) {
            clock.advance(delay);
        }
        Ok(buses)
    }

    async fn get_bus(&self, id: ObjectId) -> Result<Bus, LedgerError> {
        self.with(|s| s.buses.get_mut(&id).and_then(next)).ok_or(LedgerError::ObjectNotFound(id))
    }

    async fn get_miner(&self, id: ObjectId) -> Result<MinerRecord, LedgerError> {
        self.with(|s| {
            s.miner_reads += 1;
            next(&mut s.miner)
        })
        .ok_or(LedgerError::ObjectNotFound(id))
    }

    async fn find_miner(&self, owner: AccountAddress) -> Result<Option<ObjectId>, LedgerError> {
        Ok(self.with(|s| s.owned.get(&owner).copied()))
    }

    async fn dry_run(&self, _tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError> {
        self.with(|s| s.dry_runs.pop_front()).ok_or(LedgerError::MissingEffects)
    }

    async fn execute(&self, _tx: &SignedTransaction) -> Result<TransactionEffects, LedgerError> {
        self.with(|s| {
            let effects = s.executes.pop_front()?;
            s.executed += 1;
            if let Some((owner, miner)) = s.register_on_execute.take() {
                s.owned.insert(owner, miner);
            }
            Some(effects)
        })
        .ok_or(LedgerError::MissingEffects)
    }
}

/// Signer that records requested gas budgets
#[derive(Debug)]
pub(crate) struct MockSigner {
    address: AccountAddress,
    budgets: Mutex<Vec<Option<u64>>>,
}

impl MockSigner {
    pub(crate) fn new(address: AccountAddress) -> Self {
        Self { address, budgets: Mutex::new(Vec::new()) }
    }

    pub(crate) fn budgets(&self) -> Vec<Option<u64>> {
        self.budgets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> AccountAddress {
        self.address
    }

    async fn sign(
        &self,
        draft: &TransactionDraft,
        gas_budget: Option<u64>,
    ) -> Result<SignedTransaction, LedgerError> {
        let mut budgets = self.budgets.lock().unwrap();
        budgets.push(gas_budget);
        Ok(SignedTransaction {
            tx_bytes: format!("tx-{}-{}", budgets.len(), draft.commands.len()),
            signature: "sig".into(),
        })
    }
}

/// Virtual clock, `sleep` advances time instantly
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    now: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(now_ms)), sleeps: Arc::default() }
    }

    /// Move time forward without recording a sleep
    pub(crate) fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.now.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}
