use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type PairKey = (u64, u64);

/// Per-(form, owner) exclusive leases
///
/// Holding a lease guarantees no other materialization for the same pair runs in this
/// process until it is dropped. Entries nobody holds or waits on are pruned on acquire.
#[derive(Debug, Default)]
pub struct PairLeases {
    slots: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
}

/// An acquired lease; released on drop
#[derive(Debug)]
pub struct PairLease {
    pub form_id: u64,
    pub owner_id: u64,
    _guard: OwnedMutexGuard<()>,
}

impl PairLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, form_id: u64, owner_id: u64) -> PairLease {
        let slot = {
            // poisoning cannot leave the map half-updated
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots
                .entry((form_id, owner_id))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        PairLease {
            form_id,
            owner_id,
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of pairs currently tracked
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_pair_waits_for_release() {
        let leases = Arc::new(PairLeases::new());
        let held = leases.acquire(1, 1).await;

        let contender = {
            let leases = leases.clone();
            tokio::spawn(async move { leases.acquire(1, 1).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(held);
        let lease = tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("lease should be granted after release")
            .unwrap();
        assert_eq!((lease.form_id, lease.owner_id), (1, 1));
    }

    #[tokio::test]
    async fn different_pairs_do_not_block() {
        let leases = PairLeases::new();
        let _a = leases.acquire(1, 1).await;
        let b = tokio::time::timeout(Duration::from_millis(200), leases.acquire(1, 2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let leases = PairLeases::new();
        drop(leases.acquire(1, 1).await);
        drop(leases.acquire(2, 1).await);
        let _held = leases.acquire(3, 1).await;
        assert_eq!(leases.tracked(), 1);
    }
}
