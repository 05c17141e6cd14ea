//! Reward bus snapshots and bus selection

use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    ledger::{Ledger, LedgerError, ObjectId},
    schedule::Clock,
};

/// Snapshot of a reward bus.
///
/// Snapshots go stale after any network round trip, re-fetch instead of
/// reusing one across a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bus {
    /// Bus object id
    pub id: ObjectId,
    /// Rewards accumulated this epoch
    pub rewards: u64,
    /// Minimum rewards for the bus to be worth mining
    pub reward_rate: u64,
    /// Timestamp of the last epoch reset in milliseconds
    pub last_reset: u64,
}

impl Bus {
    /// Timestamp in milliseconds at which the bus resets next
    pub const fn next_reset(&self, epoch_length: Duration) -> u64 {
        self.last_reset.saturating_add(epoch_length.as_millis() as u64)
    }

    /// Whether the bus holds enough rewards to pay out a proof
    pub const fn is_funded(&self) -> bool {
        self.rewards >= self.reward_rate
    }
}

/// Why no bus was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// No buses were returned
    NoBuses,
    /// The top bus has fewer rewards than its reward rate
    Underfunded,
    /// The top bus resets within the safety buffer
    ClosingSoon {
        /// Milliseconds left until the reset
        remaining_ms: u64,
    },
}

/// Outcome of bus selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusSelection {
    /// The bus to mine against
    Eligible(Bus),
    /// Nothing to mine right now, wait for the next epoch and retry
    NoneEligible(Ineligible),
}

impl BusSelection {
    /// The selected bus, if any
    pub const fn eligible(&self) -> Option<&Bus> {
        match self {
            Self::Eligible(bus) => Some(bus),
            Self::NoneEligible(_) => None,
        }
    }
}

/// Picks the bus to mine against
#[derive(Debug, Clone, Copy)]
pub struct BusSelector {
    epoch_length: Duration,
    reset_buffer: Duration,
}

impl BusSelector {
    /// Create a selector for the given epoch length and safety buffer
    pub const fn new(epoch_length: Duration, reset_buffer: Duration) -> Self {
        Self { epoch_length, reset_buffer }
    }

    /// Fetch all buses in one read, richest first.
    ///
    /// Buses with equal rewards keep the order of `ids`.
    pub async fn fetch_buses<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
        ids: &[ObjectId],
    ) -> Result<Vec<Bus>, LedgerError> {
        let mut buses = ledger.multi_get_buses(ids).await?;
        sort_by_rewards(&mut buses);
        trace!(target: "mineral::bus", count = buses.len(), "Fetched buses");
        Ok(buses)
    }

    /// Check the richest bus of `buses` against `now_ms`.
    ///
    /// Only the first bus is inspected, `buses` must already be sorted.
    pub fn select(&self, buses: &[Bus], now_ms: u64) -> BusSelection {
        let Some(bus) = buses.first() else {
            return BusSelection::NoneEligible(Ineligible::NoBuses);
        };

        if !bus.is_funded() {
            debug!(
                target: "mineral::bus",
                bus = %bus.id,
                rewards = bus.rewards,
                reward_rate = bus.reward_rate,
                "Top bus underfunded"
            );
            return BusSelection::NoneEligible(Ineligible::Underfunded);
        }

        let next_reset = bus.next_reset(self.epoch_length);
        let cutoff = next_reset.saturating_sub(self.reset_buffer.as_millis() as u64);
        if now_ms >= cutoff {
            let remaining_ms = next_reset.saturating_sub(now_ms);
            debug!(
                target: "mineral::bus",
                bus = %bus.id,
                remaining_ms,
                "Top bus too close to reset"
            );
            return BusSelection::NoneEligible(Ineligible::ClosingSoon { remaining_ms });
        }

        BusSelection::Eligible(*bus)
    }

    /// Fetch the buses and select one.
    ///
    /// The clock is read once the fetch has returned, so the reset buffer is
    /// checked against the time the snapshot is acted on.
    pub async fn select_eligible<L, C>(
        &self,
        ledger: &L,
        ids: &[ObjectId],
        clock: &C,
    ) -> Result<BusSelection, LedgerError>
    where
        L: Ledger + ?Sized,
        C: Clock + ?Sized,
    {
        let buses = self.fetch_buses(ledger, ids).await?;
        Ok(self.select(&buses, clock.now_ms()))
    }
}

/// Stable sort, richest first
fn sort_by_rewards(buses: &mut [Bus]) {
    buses.sort_by(|a, b| b.rewards.cmp(&a.rewards));
}
