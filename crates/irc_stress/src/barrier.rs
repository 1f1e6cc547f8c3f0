use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use tokio::sync::watch;

use crate::errors::{StressError, StressResult};

/// One-shot countdown barrier.
///
/// Sized up front; each participant holds exactly one [`LatchTicket`] and the
/// latch opens once every ticket has been spent. A drained latch stays open.
#[derive(Debug)]
pub struct Latch {
    name: &'static str,
    size: usize,
    issued: AtomicUsize,
    remaining: watch::Sender<usize>,
}

impl Latch {
    pub fn new(name: &'static str, size: usize) -> Arc<Self> {
        let (remaining, _) = watch::channel(size);
        Arc::new(Latch {
            name,
            size,
            issued: AtomicUsize::new(0),
            remaining,
        })
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Hands out one participant ticket. Asking for more tickets than the
    /// latch was sized for is a configuration error.
    pub fn ticket(self: &Arc<Self>) -> StressResult<LatchTicket> {
        self.issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |issued| {
                (issued < self.size).then_some(issued + 1)
            })
            .map_err(|_| StressError::BarrierOverIssued {
                barrier: self.name,
                size: self.size,
            })?;
        Ok(LatchTicket {
            latch: Arc::clone(self),
            spent: false,
        })
    }

    /// Fails unless every participant slot has a ticket out.
    pub fn verify_fully_issued(&self) -> StressResult<()> {
        let issued = self.issued.load(Ordering::Acquire);
        if issued == self.size {
            Ok(())
        } else {
            Err(StressError::BarrierUnderIssued {
                barrier: self.name,
                issued,
                size: self.size,
            })
        }
    }

    pub async fn wait(&self) {
        let mut remaining = self.remaining.subscribe();
        // the sender lives as long as `self`, so this cannot report a closed channel
        let _ = remaining.wait_for(|remaining| *remaining == 0).await;
    }

    fn count_down(&self) {
        self.remaining.send_modify(|remaining| {
            *remaining = remaining.saturating_sub(1);
        });
        debug!("latch '{}': {} remaining", self.name, self.remaining());
    }
}

/// A participant's slot in a [`Latch`]. Counts down once, either through
/// [`LatchTicket::arrive`] or when dropped unspent.
#[derive(Debug)]
pub struct LatchTicket {
    latch: Arc<Latch>,
    spent: bool,
}

impl LatchTicket {
    /// Counts down and hands back the latch so the caller can wait on it.
    pub fn arrive(mut self) -> Arc<Latch> {
        self.spent = true;
        self.latch.count_down();
        Arc::clone(&self.latch)
    }
}

impl Drop for LatchTicket {
    fn drop(&mut self) {
        if !self.spent {
            self.spent = true;
            self.latch.count_down();
        }
    }
}
