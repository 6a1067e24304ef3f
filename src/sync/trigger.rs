//! Shared/exclusive counted lock with transition callbacks.
//!
//! # Responsibilities
//! - Count shared holds and track a single exclusive hold
//! - Fire `on_acquire` / `on_release` exactly once per transition into and
//!   out of the held state
//! - Keep shared and exclusive holds mutually exclusive
//!
//! # Design Decisions
//! - Two locks: a gate (shared/exclusive, writer-preferring) and a
//!   transition mutex that owns the shared count and serializes callbacks
//! - State changes are committed before callbacks run; a panicking callback
//!   never rolls them back
//! - `parking_lot` mutexes do not poison, so the trigger stays usable after a
//!   callback panic
//! - Not reentrant, and misuse is not detected

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

type Callback = Box<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Default)]
struct GateState {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
}

/// Writer-preferring shared/exclusive lock without guards, so holds can
/// outlive the call that took them.
#[derive(Debug, Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    fn lock_shared(&self) {
        let mut state = self.state.lock();
        while state.writer || state.writers_waiting > 0 {
            self.changed.wait(&mut state);
        }
        state.readers += 1;
    }

    fn try_lock_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.writer || state.writers_waiting > 0 {
            return false;
        }
        state.readers += 1;
        true
    }

    fn unlock_shared(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.changed.notify_all();
        }
    }

    fn lock_exclusive(&self) {
        let mut state = self.state.lock();
        state.writers_waiting += 1;
        while state.writer || state.readers > 0 {
            self.changed.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer = true;
    }

    /// Like `lock_exclusive`, giving up at `deadline`. A timed-out waiter
    /// withdraws so held-back readers can proceed.
    fn lock_exclusive_until(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        state.writers_waiting += 1;
        while state.writer || state.readers > 0 {
            let timed_out = self.changed.wait_until(&mut state, deadline).timed_out();
            if timed_out && (state.writer || state.readers > 0) {
                state.writers_waiting -= 1;
                self.changed.notify_all();
                return false;
            }
        }
        state.writers_waiting -= 1;
        state.writer = true;
        true
    }

    fn unlock_exclusive(&self) {
        let mut state = self.state.lock();
        state.writer = false;
        self.changed.notify_all();
    }

    fn is_exclusive(&self) -> bool {
        self.state.lock().writer
    }
}

/// Drops the transition mutex, then the reader hold.
struct SharedExit<'a> {
    count: Option<MutexGuard<'a, usize>>,
    gate: &'a Gate,
}

impl Drop for SharedExit<'_> {
    fn drop(&mut self) {
        drop(self.count.take());
        self.gate.unlock_shared();
    }
}

struct ExclusiveExit<'a>(&'a Gate);

impl Drop for ExclusiveExit<'_> {
    fn drop(&mut self) {
        self.0.unlock_exclusive();
    }
}

/// A counted shared/exclusive lock that reports when it becomes held and
/// when it becomes free again.
///
/// The callbacks receive `true` for exclusive transitions and `false` for
/// shared ones.
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use muxkit::sync::Trigger;
///
/// let busy = Arc::new(AtomicBool::new(false));
/// let (on, off) = (busy.clone(), busy.clone());
/// let trigger = Trigger::new()
///     .on_acquire(move |_| on.store(true, Ordering::SeqCst))
///     .on_release(move |_| off.store(false, Ordering::SeqCst));
///
/// trigger.acquire_shared();
/// trigger.acquire_shared();
/// trigger.release_shared();
/// assert!(busy.load(Ordering::SeqCst));
/// trigger.release_shared();
/// assert!(!busy.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct Trigger {
    gate: Gate,
    /// Transition mutex; owns the shared count.
    count: Mutex<usize>,
    on_acquire: Option<Callback>,
    on_release: Option<Callback>,
}

impl Trigger {
    /// Create a trigger without callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback fired on every transition into the held state.
    pub fn on_acquire<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_acquire = Some(Box::new(f));
        self
    }

    /// Set the callback fired on every transition out of the held state.
    pub fn on_release<F>(mut self, f: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_release = Some(Box::new(f));
        self
    }

    /// Take a shared hold, blocking while an exclusive hold is active or
    /// pending.
    ///
    /// The first shared hold fires `on_acquire(false)` before returning.
    pub fn acquire_shared(&self) {
        self.gate.lock_shared();
        self.enter_shared();
    }

    /// Take a shared hold only if no exclusive hold is active or pending.
    /// Never blocks on the gate.
    pub fn try_acquire_shared(&self) -> bool {
        if !self.gate.try_lock_shared() {
            return false;
        }
        self.enter_shared();
        true
    }

    fn enter_shared(&self) {
        let mut count = self.count.lock();
        *count += 1;
        if *count == 1 {
            tracing::trace!("Trigger held (shared)");
            if let Some(f) = &self.on_acquire {
                f(false);
            }
        }
    }

    /// Give back a shared hold.
    ///
    /// The last shared hold fires `on_release(false)`.
    ///
    /// # Panics
    ///
    /// Panics if no shared hold is outstanding.
    pub fn release_shared(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            drop(count);
            panic!("trigger: release_shared called without a shared hold");
        }
        *count -= 1;
        let idle = *count == 0;

        let _exit = SharedExit {
            count: Some(count),
            gate: &self.gate,
        };
        if idle {
            tracing::trace!("Trigger released (shared)");
            if let Some(f) = &self.on_release {
                f(false);
            }
        }
    }

    /// Take the exclusive hold, blocking until every shared hold and any
    /// other exclusive hold is gone. Fires `on_acquire(true)`.
    pub fn acquire_exclusive(&self) {
        self.gate.lock_exclusive();
        self.enter_exclusive();
    }

    /// Take the exclusive hold, waiting at most `timeout`.
    ///
    /// Returns `false` without firing any callback when the wait times out;
    /// shared acquirers held back by this waiter are released again.
    pub fn try_acquire_exclusive_for(&self, timeout: Duration) -> bool {
        if !self.gate.lock_exclusive_until(Instant::now() + timeout) {
            return false;
        }
        self.enter_exclusive();
        true
    }

    fn enter_exclusive(&self) {
        tracing::trace!("Trigger held (exclusive)");
        if let Some(f) = &self.on_acquire {
            f(true);
        }
    }

    /// Fire `on_release(true)`, then give back the exclusive hold.
    ///
    /// # Panics
    ///
    /// Panics if the exclusive hold is not taken.
    pub fn release_exclusive(&self) {
        if !self.gate.is_exclusive() {
            panic!("trigger: release_exclusive called without the exclusive hold");
        }
        let _exit = ExclusiveExit(&self.gate);
        tracing::trace!("Trigger released (exclusive)");
        if let Some(f) = &self.on_release {
            f(true);
        }
    }

    /// Take a shared hold released when the guard drops.
    pub fn shared(&self) -> SharedHold<'_> {
        self.acquire_shared();
        SharedHold { trigger: self }
    }

    /// Non-blocking [`shared`](Self::shared).
    pub fn try_shared(&self) -> Option<SharedHold<'_>> {
        self.try_acquire_shared()
            .then(|| SharedHold { trigger: self })
    }

    /// Take the exclusive hold, released when the guard drops.
    pub fn exclusive(&self) -> ExclusiveHold<'_> {
        self.acquire_exclusive();
        ExclusiveHold { trigger: self }
    }

    /// Number of shared holds right now.
    pub fn shared_count(&self) -> usize {
        *self.count.lock()
    }

    pub fn is_exclusive(&self) -> bool {
        self.gate.is_exclusive()
    }

    pub fn is_held(&self) -> bool {
        self.is_exclusive() || self.shared_count() > 0
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("shared", &self.shared_count())
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

/// Shared hold on a [`Trigger`]; released on drop.
#[must_use = "the hold is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SharedHold<'a> {
    trigger: &'a Trigger,
}

impl Drop for SharedHold<'_> {
    fn drop(&mut self) {
        self.trigger.release_shared();
    }
}

/// Exclusive hold on a [`Trigger`]; released on drop.
#[must_use = "the hold is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ExclusiveHold<'a> {
    trigger: &'a Trigger,
}

impl Drop for ExclusiveHold<'_> {
    fn drop(&mut self) {
        self.trigger.release_exclusive();
    }
}
