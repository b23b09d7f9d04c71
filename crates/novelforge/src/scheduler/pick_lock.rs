//! The pick-lock: a mutex around the in-flight set, acquired by polling so
//! waiting workers notice shutdown.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::signal::Signal;

/// In-flight key reserved for the cleaner.
pub const CLEANER_SLOT: &str = "cleaner";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Work currently owned by some worker, keyed by job id, plus the cleaner
/// slot and its last run.
#[derive(Debug, Default)]
pub struct InFlight {
    slots: HashMap<String, Signal>,
    cleaner_last_run: Option<Instant>,
}

impl InFlight {
    pub fn ids(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Marks `id` in flight and returns its cancellation signal.
    pub fn insert(&mut self, id: &str) -> Signal {
        let signal = Signal::new();
        self.slots.insert(id.to_string(), signal.clone());
        signal
    }

    pub fn remove(&mut self, id: &str) {
        self.slots.remove(id);
    }

    /// Wakes the runner of `id`, if one is in flight.
    pub fn signal(&self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(signal) => {
                signal.set();
                true
            }
            None => false,
        }
    }

    /// Whether the cleaner is idle and its cooldown has passed.
    pub fn cleaner_due(&self, cooldown: Duration) -> bool {
        !self.slots.contains_key(CLEANER_SLOT)
            && self
                .cleaner_last_run
                .map_or(true, |last| last.elapsed() >= cooldown)
    }

    pub fn claim_cleaner(&mut self) {
        self.insert(CLEANER_SLOT);
    }

    pub fn release_cleaner(&mut self) {
        self.slots.remove(CLEANER_SLOT);
        self.cleaner_last_run = Some(Instant::now());
    }
}

#[derive(Debug, Default)]
pub struct PickLock {
    inner: Mutex<InFlight>,
}

impl PickLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock. Returns `None` once `shutdown` is set.
    pub fn acquire(&self, shutdown: &Signal) -> Option<MutexGuard<'_, InFlight>> {
        loop {
            if shutdown.is_set() {
                return None;
            }
            match self.inner.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if shutdown.wait(POLL_INTERVAL) {
                        return None;
                    }
                }
            }
        }
    }

    /// Blocks for the lock regardless of shutdown. Used to release slots.
    pub fn acquire_always(&self) -> MutexGuard<'_, InFlight> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cleaner_slot_cooldown() {
        let mut in_flight = InFlight::default();
        assert!(in_flight.cleaner_due(Duration::from_secs(3600)));

        in_flight.claim_cleaner();
        assert!(in_flight.contains(CLEANER_SLOT));
        assert!(!in_flight.cleaner_due(Duration::ZERO));

        in_flight.release_cleaner();
        assert!(!in_flight.cleaner_due(Duration::from_secs(3600)));
        assert!(in_flight.cleaner_due(Duration::ZERO));
    }

    #[test]
    fn test_signal_in_flight_job() {
        let mut in_flight = InFlight::default();
        let signal = in_flight.insert("job-1");
        assert!(in_flight.signal("job-1"));
        assert!(signal.is_set());
        assert!(!in_flight.signal("job-2"));

        in_flight.remove("job-1");
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_acquire_aborts_on_shutdown() {
        let lock = Arc::new(PickLock::new());
        let shutdown = Signal::new();
        let held = lock.acquire(&shutdown).unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            let shutdown = shutdown.clone();
            std::thread::spawn(move || lock.acquire(&shutdown).is_none())
        };
        std::thread::sleep(Duration::from_millis(20));
        shutdown.set();
        assert!(waiter.join().unwrap());

        drop(held);
        let _guard = lock.acquire_always();
    }
}
