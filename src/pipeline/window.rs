use std::sync::{Condvar, Mutex, MutexGuard};

use crate::foundation::error::ChannelClosed;

struct Credits {
    available: usize,
    closed: bool,
}

/// Admission credits shared between the worker pool and the sequencer.
///
/// A worker acquires a credit before it takes a frame; the sequencer returns one whenever it
/// releases a frame downstream. With `size` credits, at most `size` frames sit between the
/// ingress channel and the output accumulator, so the reorder buffer holds at most `size - 1`.
pub(crate) struct ReorderWindow {
    credits: Mutex<Credits>,
    freed: Condvar,
    size: usize,
}

impl ReorderWindow {
    pub(crate) fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            credits: Mutex::new(Credits {
                available: size,
                closed: false,
            }),
            freed: Condvar::new(),
            size,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Block until a credit is free.
    pub(crate) fn acquire(&self) -> Result<(), ChannelClosed> {
        let mut credits = self.lock();
        loop {
            if credits.closed {
                return Err(ChannelClosed);
            }
            if credits.available > 0 {
                credits.available -= 1;
                return Ok(());
            }
            credits = self
                .freed
                .wait(credits)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Return a credit. Extra releases beyond `size` are ignored.
    pub(crate) fn release(&self) {
        let mut credits = self.lock();
        if credits.available < self.size {
            credits.available += 1;
        }
        drop(credits);
        self.freed.notify_one();
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.freed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, Credits> {
        self.credits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/window.rs"]
mod tests;
