use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

use crate::config::OverrunPolicy;

/// Cooperative cancellation flag checked at every suspension point.
#[derive(Debug, Default)]
pub struct StopFlag(CachePadded<AtomicBool>);

impl StopFlag {
    pub fn new() -> StopFlag {
        StopFlag::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cloneable handle that asks a running pipeline to shut down.
#[derive(Clone, Debug)]
pub struct ShutdownHandle(pub(crate) Arc<StopFlag>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.request();
    }

    pub fn is_requested(&self) -> bool {
        self.0.is_set()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub raised: u64,
    pub cleared: u64,
    pub coalesced: u64,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    stats: SignalStats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Raise {
    /// The signal went from clear to pending.
    Raised,
    /// A chunk was already pending; this boundary folded into it.
    Coalesced,
    /// Shutdown was requested while blocked on a pending chunk.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    Ready,
    TimedOut,
    Stopped,
}

/// The chunk-ready handoff between the ingestor and the emitter.
///
/// The ingestor raises after it has released the buffer lock for the boundary
/// sample, and the emitter only clears after forwarding, so the mutex around the
/// pending bit orders every append of an epoch before the snapshot that serves it.
/// At most one raise is outstanding at any time.
#[derive(Debug, Default)]
pub struct ReadySignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl ReadySignal {
    pub fn new() -> ReadySignal {
        ReadySignal::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_slice<'a>(
        &self,
        guard: MutexGuard<'a, SignalState>,
        slice: Duration,
    ) -> MutexGuard<'a, SignalState> {
        match self.cond.wait_timeout(guard, slice) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    pub fn stats(&self) -> SignalStats {
        self.lock().stats
    }

    /// Marks a chunk as ready. `slice` bounds each wait under [`OverrunPolicy::Block`]
    /// so a stop request is seen promptly.
    pub fn raise(&self, policy: OverrunPolicy, stop: &StopFlag, slice: Duration) -> Raise {
        let mut state = self.lock();

        if state.pending {
            match policy {
                OverrunPolicy::Coalesce => {
                    state.stats.coalesced += 1;
                    return Raise::Coalesced;
                }
                OverrunPolicy::Block => {
                    while state.pending {
                        if stop.is_set() {
                            return Raise::Stopped;
                        }
                        state = self.wait_slice(state, slice);
                    }
                }
            }
        }

        state.pending = true;
        state.stats.raised += 1;
        self.cond.notify_all();
        Raise::Raised
    }

    /// Blocks until a chunk is pending, `timeout` passes, or a stop is requested.
    /// A pending chunk wins over a stop request so it still gets forwarded.
    pub fn wait(&self, stop: &StopFlag, timeout: Duration) -> Wait {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if state.pending {
                return Wait::Ready;
            }
            if stop.is_set() {
                return Wait::Stopped;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wait::TimedOut;
            }
            state = self.wait_slice(state, deadline - now);
        }
    }

    /// Clears a pending chunk once it has been handled. Returns false if nothing
    /// was pending.
    pub fn clear(&self) -> bool {
        let mut state = self.lock();
        if !state.pending {
            return false;
        }
        state.pending = false;
        state.stats.cleared += 1;
        self.cond.notify_all();
        true
    }

    /// Wakes every waiter so it re-checks the stop flag.
    pub fn wake_all(&self) {
        let _state = self.lock();
        self.cond.notify_all();
    }
}
