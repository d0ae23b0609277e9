//! Counts work that is still travelling around the feedback loop.
//!
//! A unit is taken when a command enters a CommandInterpreter or an event is
//! handed to a tracked subscriber, and released once it has been dispatched
//! (commands) or fully interpreted (events). Follow-up work always takes its
//! unit before the work that caused it releases, so the count only reaches
//! zero when the loop has nothing left to do.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    idle: Notify,
}

/// Shared in-flight counter. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<Inner>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }

    /// Resolve once nothing is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            idle.await;
        }
    }

    /// Take a new unit.
    pub(crate) fn ticket(&self) -> Ticket {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        self.adopt()
    }

    /// Wrap a unit that was taken earlier and handed off through a queue.
    pub(crate) fn adopt(&self) -> Ticket {
        Ticket {
            owner: Some(self.clone()),
        }
    }

    fn release(&self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// One unit of in-flight work. Dropping it releases the unit.
#[derive(Debug)]
pub(crate) struct Ticket {
    owner: Option<InFlight>,
}

impl Ticket {
    /// The unit now travels with a queued item; whoever takes the item out
    /// adopts it again.
    pub(crate) fn hand_off(mut self) {
        self.owner = None;
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.release();
        }
    }
}
