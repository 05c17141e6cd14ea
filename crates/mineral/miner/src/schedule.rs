//! Waiting on ledger-confirmed state changes.
//!
//! Time is read and slept through a [`Clock`] so epoch boundaries and
//! polling can be driven by a virtual clock in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::B256;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    bus::Bus,
    ledger::{Ledger, LedgerError, ObjectId},
};

/// Source of wall-clock time and timed suspension
#[async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch
    fn now_ms(&self) -> u64;

    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the system time and tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of reads
    pub attempts: u32,
    /// Pause between reads
    pub interval: Duration,
}

impl PollPolicy {
    /// Create a policy
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

/// Scheduling errors
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The miner hash never changed after a submission
    #[error("Failed to acquire new hash for miner {miner} after {attempts} attempts")]
    HashUnchanged {
        /// Miner object
        miner: ObjectId,
        /// Reads performed
        attempts: u32,
    },

    /// The bus never reset within the poll limit
    #[error("Bus {bus} did not reset after {polls} polls")]
    EpochStalled {
        /// Bus object
        bus: ObjectId,
        /// Reads performed after the expected reset
        polls: u32,
    },

    /// Ledger read failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fixed-backoff waits for epoch resets and hash changes
#[derive(Debug, Clone)]
pub struct RetryScheduler<C> {
    clock: C,
    epoch_length: Duration,
    epoch_poll: PollPolicy,
    hash_poll: PollPolicy,
}

impl<C: Clock> RetryScheduler<C> {
    /// Create a scheduler
    pub const fn new(
        clock: C,
        epoch_length: Duration,
        epoch_poll: PollPolicy,
        hash_poll: PollPolicy,
    ) -> Self {
        Self { clock, epoch_length, epoch_poll, hash_poll }
    }

    /// The underlying clock
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Sleep for a fixed duration
    pub async fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration).await;
    }

    /// Wait until bus `bus_id` has reset.
    ///
    /// Sleeps until the expected reset, then polls until `last_reset` differs
    /// from the value read on entry. Returns the fresh snapshot.
    pub async fn await_epoch_advance<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        bus_id: ObjectId,
    ) -> Result<Bus, ScheduleError> {
        let bus = ledger.get_bus(bus_id).await?;
        let observed = bus.last_reset;

        let remaining = bus.next_reset(self.epoch_length).saturating_sub(self.clock.now_ms());
        if remaining > 0 {
            info!(
                target: "mineral::schedule",
                bus = %bus_id,
                remaining_ms = remaining,
                "Waiting for epoch reset"
            );
            self.clock.sleep(Duration::from_millis(remaining)).await;
        }

        for poll in 1..=self.epoch_poll.attempts {
            let fresh = ledger.get_bus(bus_id).await?;
            if fresh.last_reset != observed {
                debug!(
                    target: "mineral::schedule",
                    bus = %bus_id,
                    last_reset = fresh.last_reset,
                    polls = poll,
                    "Epoch advanced"
                );
                return Ok(fresh);
            }
            self.clock.sleep(self.epoch_poll.interval).await;
        }

        warn!(target: "mineral::schedule", bus = %bus_id, "Bus reset overdue");
        Err(ScheduleError::EpochStalled { bus: bus_id, polls: self.epoch_poll.attempts })
    }

    /// Wait until the miner's recorded hash differs from `observed`.
    ///
    /// Returns the new hash. Exhausting the attempts means the contract never
    /// acknowledged the submission and the round must not continue.
    pub async fn await_hash_change<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        miner: ObjectId,
        observed: B256,
    ) -> Result<B256, ScheduleError> {
        let attempts = self.hash_poll.attempts;
        for attempt in 1..=attempts {
            let record = ledger.get_miner(miner).await?;
            if record.current_hash != observed {
                debug!(
                    target: "mineral::schedule",
                    %miner,
                    hash = %record.current_hash,
                    attempt,
                    "Miner hash changed"
                );
                return Ok(record.current_hash);
            }
            if attempt < attempts {
                self.clock.sleep(self.hash_poll.interval).await;
            }
        }

        Err(ScheduleError::HashUnchanged { miner, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::MinerRecord, test_utils::{ManualClock, MockLedger}};

    const EPOCH: Duration = Duration::from_millis(60_000);

    fn scheduler(clock: ManualClock) -> RetryScheduler<ManualClock> {
        RetryScheduler::new(
            clock,
            EPOCH,
            PollPolicy::new(10, Duration::from_millis(1_500)),
            PollPolicy::new(5, Duration::from_millis(2_000)),
        )
    }

    fn miner(hash: u8) -> MinerRecord {
        MinerRecord { id: ObjectId::repeat_byte(9), current_hash: B256::repeat_byte(hash) }
    }

    #[tokio::test]
    async fn test_hash_change_on_third_poll() {
        let ledger = MockLedger::default();
        ledger.script_miner(vec![miner(1), miner(1), miner(2)]);
        let clock = ManualClock::new(0);

        let hash = scheduler(clock.clone())
            .await_hash_change(&ledger, ObjectId::repeat_byte(9), B256::repeat_byte(1))
            .await
            .unwrap();

        assert_eq!(hash, B256::repeat_byte(2));
        assert_eq!(ledger.miner_reads(), 3);
        assert_eq!(clock.now_ms(), 4_000);
    }

    #[tokio::test]
    async fn test_hash_change_on_last_allowed_poll() {
        let ledger = MockLedger::default();
        ledger.script_miner(vec![miner(1), miner(1), miner(1), miner(1), miner(2)]);
        let clock = ManualClock::new(0);

        let hash = scheduler(clock.clone())
            .await_hash_change(&ledger, ObjectId::repeat_byte(9), B256::repeat_byte(1))
            .await
            .unwrap();

        assert_eq!(hash, B256::repeat_byte(2));
        assert_eq!(ledger.miner_reads(), 5);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(2_000); 4]);
    }

    #[tokio::test]
    async fn test_hash_unchanged_times_out_after_five_polls() {
        let ledger = MockLedger::default();
        ledger.script_miner(vec![miner(1)]);
        let clock = ManualClock::new(0);

        let err = scheduler(clock.clone())
            .await_hash_change(&ledger, ObjectId::repeat_byte(9), B256::repeat_byte(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ScheduleError::HashUnchanged { attempts: 5, .. }));
        assert_eq!(ledger.miner_reads(), 5);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(2_000); 4]);
    }

    #[tokio::test]
    async fn test_epoch_advance_sleeps_until_reset_then_polls() {
        let ledger = MockLedger::default();
        let stale = Bus { id: ObjectId::repeat_byte(1), rewards: 0, reward_rate: 1, last_reset: 1_000 };
        let fresh = Bus { last_reset: 61_200, ..stale };
        ledger.script_bus(vec![stale, stale, stale, fresh]);
        let clock = ManualClock::new(21_000);

        let bus = scheduler(clock.clone())
            .await_epoch_advance(&ledger, stale.id)
            .await
            .unwrap();

        assert_eq!(bus.last_reset, 61_200);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(40_000),
                Duration::from_millis(1_500),
                Duration::from_millis(1_500),
            ]
        );
    }

    #[tokio::test]
    async fn test_epoch_advance_skips_sleep_when_overdue() {
        let ledger = MockLedger::default();
        let stale = Bus { id: ObjectId::repeat_byte(1), rewards: 0, reward_rate: 1, last_reset: 0 };
        ledger.script_bus(vec![stale, Bus { last_reset: 60_000, ..stale }]);
        let clock = ManualClock::new(90_000);

        scheduler(clock.clone()).await_epoch_advance(&ledger, stale.id).await.unwrap();
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_epoch_stalled() {
        let ledger = MockLedger::default();
        let stale = Bus { id: ObjectId::repeat_byte(1), rewards: 0, reward_rate: 1, last_reset: 0 };
        ledger.script_bus(vec![stale]);
        let clock = ManualClock::new(90_000);

        let err = scheduler(clock).await_epoch_advance(&ledger, stale.id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::EpochStalled { polls: 10, .. }));
    }

    #[tokio::test]
    async fn test_sleep_uses_clock() {
        let clock = ManualClock::new(5);
        scheduler(clock.clone()).sleep(Duration::from_millis(20)).await;
        assert_eq!(clock.now_ms(), 25);
    }
}
