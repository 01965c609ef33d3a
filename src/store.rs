use crate::generator::RecordSet;
use std::sync::{Arc, RwLock};

/// Atomic swap holder for the most recent [`RecordSet`] (§4.4). Readers take
/// a shared reference and may retain it for the lifetime of a handler without
/// re-acquiring the lock; the Reload Loop replaces the reference wholesale.
#[derive(Debug)]
pub struct Store {
    current: RwLock<Arc<RecordSet>>,
    serial: RwLock<u32>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            current: RwLock::new(Arc::new(RecordSet::default())),
            serial: RwLock::new(0),
        }
    }

    /// A consistent, immutable snapshot of the current record set.
    pub fn snapshot(&self) -> Arc<RecordSet> {
        Arc::clone(&self.current.read().unwrap())
    }

    pub fn serial(&self) -> u32 {
        *self.serial.read().unwrap()
    }

    /// Replaces the stored reference and bumps the SOA serial (§4.4 step 3).
    /// Readers that already captured the previous `Arc` keep a valid,
    /// unmodified view of it.
    pub fn publish(&self, records: RecordSet, serial: u32) {
        *self.current.write().unwrap() = Arc::new(records);
        *self.serial.write().unwrap() = serial;
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_publish() {
        let store = Store::new();
        let before = store.snapshot();
        assert!(before.a.is_empty());

        let mut next = RecordSet::default();
        next.a.insert("x.".to_string(), vec!["1.2.3.4".to_string()]);
        store.publish(next, 42);

        assert!(before.a.is_empty());
        assert_eq!(store.serial(), 42);
        assert_eq!(store.snapshot().a["x."], vec!["1.2.3.4"]);
    }
}
