use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::RequestId;

/// Serializes workflow transitions per request id.
///
/// Two callers acting on the same request run one after the other; different requests never
/// contend beyond the brief map lookup.
#[derive(Default)]
pub struct RequestLocks {
    slots: Mutex<HashMap<RequestId, Arc<Mutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: RequestId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id).or_default().clone()
    }

    /// Run `work` while holding the lock for `id`.
    pub fn run<T>(&self, id: RequestId, work: impl FnOnce() -> T) -> T {
        let slot = self.slot(id);
        let result = {
            // The mutex guards no data, so a panic in an earlier holder leaves nothing to repair.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(id, slot);
        result
    }

    /// Drop the slot once nobody else holds or waits on it.
    fn release(&self, id: RequestId, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under the map lock: the map plus `slot` means no waiters.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
