//! Progress events for observers of the mining loop

use tokio::sync::mpsc;
use tracing::trace;

/// Milestones of a mining round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MineEvent {
    /// A bus reset was observed after waiting
    Resetting,
    /// A round failed and is being restarted
    Retrying,
    /// A transaction is being dry run
    Simulating,
    /// A transaction is being submitted
    Submitting,
    /// A proof was accepted
    Success,
    /// The miner hash advanced, next round can start
    Checkpoint,
    /// No bus is eligible, waiting for the next epoch
    Waiting,
}

/// Optional event channel. Events are dropped when nobody listens or the
/// channel is full, mining never blocks on an observer.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<MineEvent>>,
}

impl EventSink {
    /// Sink that discards everything
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a sink and the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Publish an event
    pub fn emit(&self, event: MineEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                trace!(target: "mineral::events", ?event, error = %e, "Dropped mine event");
            }
        }
    }
}
