use std::sync::{Condvar, Mutex, PoisonError};

/// Counting permit guarding the planning backend.
///
/// Built with capacity 1 in production so at most one planning or synthesis
/// call is in flight process-wide. Shared explicitly through `Arc`.
#[derive(Debug)]
pub struct AdmissionGate {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }
    }

    pub fn single() -> Self {
        Self::new(1)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a slot is free. The slot returns when the permit drops.
    pub fn acquire(&self) -> AdmissionPermit<'_> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        AdmissionPermit { gate: self }
    }

    fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available = (*available + 1).min(self.capacity);
        self.released.notify_one();
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::single()
    }
}

#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct AdmissionPermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
