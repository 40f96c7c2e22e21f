//! Cross-thread signalling.
//!
//! Two primitives carry all of the pipeline's scheduling:
//!
//! - [`Semaphore`], a counting semaphore built from a `parking_lot` mutex
//!   and condvar. One instance (initial value 1) is the double-buffer
//!   governor that keeps the dispatcher at most one frame ahead; one per
//!   observer session (initial value 0) signals "a frame is ready for you".
//! - [`WorkQueue`], the dispatch FIFO any idle slave pops from, with
//!   head-push for out-of-band probe units and in-flight accounting so a
//!   shutdown can drain outstanding work.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Counting semaphore: `wait` blocks at zero and decrements, `post`
/// increments and wakes one waiter.
#[derive(Debug)]
pub struct Semaphore {
    value: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> Self {
        Self {
            value: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn wait(&self) {
        let mut v = self.value.lock();
        while *v == 0 {
            self.cond.wait(&mut v);
        }
        *v -= 1;
    }

    pub fn post(&self) {
        let mut v = self.value.lock();
        *v += 1;
        self.cond.notify_one();
    }

    /// Post only when no signal is pending. Used for the per-observer
    /// frame semaphores: an observer that skipped a frame should not build
    /// up a backlog of stale wakeups.
    pub fn post_if_clear(&self) {
        let mut v = self.value.lock();
        if *v == 0 {
            *v = 1;
            self.cond.notify_one();
        }
    }

    pub fn value(&self) -> u32 {
        *self.value.lock()
    }
}

/// Blocking multi-consumer FIFO with in-flight accounting.
///
/// `pop` hands a unit to a slave service thread and counts it in flight
/// until `complete` or `requeue_front` returns it. `wait_idle` blocks until
/// both the queue and the in-flight set are empty, which is the master's
/// shutdown drain.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
    idle: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    in_flight: usize,
    closed: bool,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                in_flight: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    pub fn push_back(&self, item: T) {
        let mut s = self.state.lock();
        s.items.push_back(item);
        self.ready.notify_one();
    }

    /// Out-of-band insert at the head; probe shots jump the tile backlog.
    pub fn push_front(&self, item: T) {
        let mut s = self.state.lock();
        s.items.push_front(item);
        self.ready.notify_one();
    }

    /// Block for the next unit. `None` means the queue was closed and
    /// drained; the consumer should exit.
    pub fn pop(&self) -> Option<T> {
        let mut s = self.state.lock();
        loop {
            if let Some(item) = s.items.pop_front() {
                s.in_flight += 1;
                return Some(item);
            }
            if s.closed {
                return None;
            }
            self.ready.wait(&mut s);
        }
    }

    /// The popped unit finished (result arrived or was discarded).
    pub fn complete(&self) {
        let mut s = self.state.lock();
        debug_assert!(s.in_flight > 0);
        s.in_flight -= 1;
        if s.in_flight == 0 && s.items.is_empty() {
            self.idle.notify_all();
        }
    }

    /// The popped unit's slave died; put it back at the head for the next
    /// idle slave.
    pub fn requeue_front(&self, item: T) {
        let mut s = self.state.lock();
        debug_assert!(s.in_flight > 0);
        s.in_flight -= 1;
        s.items.push_front(item);
        self.ready.notify_one();
    }

    /// Wake every blocked consumer; subsequent `pop`s drain the backlog and
    /// then return `None`.
    pub fn close(&self) {
        let mut s = self.state.lock();
        s.closed = true;
        self.ready.notify_all();
        if s.in_flight == 0 && s.items.is_empty() {
            self.idle.notify_all();
        }
    }

    /// Block until no unit is queued or in flight.
    pub fn wait_idle(&self) {
        let mut s = self.state.lock();
        while s.in_flight > 0 || !s.items.is_empty() {
            self.idle.wait(&mut s);
        }
    }

    /// Drain like [`Self::wait_idle`], but when `abandoned()` reports that
    /// no consumer is left, discard whatever is still queued instead of
    /// waiting for work that nobody will ever pop.
    pub fn wait_idle_or_abandon(&self, abandoned: impl Fn() -> bool) {
        let mut s = self.state.lock();
        while s.in_flight > 0 || !s.items.is_empty() {
            if s.in_flight == 0 && abandoned() {
                s.items.clear();
                return;
            }
            let _ = self
                .idle
                .wait_for(&mut s, Duration::from_millis(50));
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}
