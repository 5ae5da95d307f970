use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::foundation::error::ChannelClosed;

/// Outcome of a successful [`BoundedChannel::take`].
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// Next item in FIFO order.
    Item(T),
    /// The producer finished; no further items will arrive.
    EndOfStream,
}

impl<T> Recv<T> {
    /// Return the item, or `None` at end-of-stream.
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            Self::EndOfStream => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    // End-of-stream enqueued, still behind buffered items.
    Finishing,
    // End-of-stream observed by a consumer; sticky for every later take.
    Drained,
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    phase: Phase,
    high_water: usize,
}

/// Fixed-capacity FIFO handoff between two pipeline stages.
///
/// - `put` blocks while the channel is full (backpressure on the producer).
/// - `take` blocks while it is empty.
/// - `finish` appends the end-of-stream marker exactly once. After a consumer has observed it,
///   every later `take` also returns [`Recv::EndOfStream`], so several consumers can each see it.
/// - `close` tears the channel down from any thread: buffered items are dropped and all blocked
///   and future calls fail with [`ChannelClosed`].
///
/// Multiple producers and consumers may share one channel by reference; each item is delivered
/// to exactly one `take`.
pub struct BoundedChannel<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                phase: Phase::Open,
                high_water: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// `true` when no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest number of items that were ever buffered at once.
    pub fn high_water(&self) -> usize {
        self.lock().high_water
    }

    /// `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().phase == Phase::Closed
    }

    /// Enqueue `item`, blocking while the channel is full.
    pub fn put(&self, item: T) -> Result<(), ChannelClosed> {
        let mut state = self.lock();
        loop {
            if state.phase != Phase::Open {
                return Err(ChannelClosed);
            }
            if state.queue.len() < self.capacity {
                break;
            }
            state = self.wait(&self.not_full, state);
        }
        state.queue.push_back(item);
        state.high_water = state.high_water.max(state.queue.len());
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue the end-of-stream marker. It is delivered after every item already buffered.
    pub fn finish(&self) -> Result<(), ChannelClosed> {
        let mut state = self.lock();
        if state.phase != Phase::Open {
            return Err(ChannelClosed);
        }
        state.phase = Phase::Finishing;
        drop(state);
        self.not_empty.notify_all();
        // Producers blocked on a full queue can never succeed now.
        self.not_full.notify_all();
        Ok(())
    }

    /// Dequeue the next item, blocking while the channel is empty.
    pub fn take(&self) -> Result<Recv<T>, ChannelClosed> {
        let mut state = self.lock();
        loop {
            if state.phase == Phase::Closed {
                return Err(ChannelClosed);
            }
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(Recv::Item(item));
            }
            if state.phase != Phase::Open {
                state.phase = Phase::Drained;
                return Ok(Recv::EndOfStream);
            }
            state = self.wait(&self.not_empty, state);
        }
    }

    /// Tear the channel down, dropping buffered items and waking every waiter.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.lock();
            state.phase = Phase::Closed;
            std::mem::take(&mut state.queue)
        };
        self.not_full.notify_all();
        self.not_empty.notify_all();
        drop(dropped);
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Every critical section leaves the state consistent, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(&self, cv: &Condvar, guard: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        cv.wait(guard).unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/channel.rs"]
mod tests;
