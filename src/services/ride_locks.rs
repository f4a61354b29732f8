// src/services/ride_locks.rs
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-ride async locks held across load-check-save so that assignment and
/// lifecycle transitions on one ride never interleave.
#[derive(Default)]
pub struct RideLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

pub struct RideLockGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    ride_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl RideLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, ride_id: &str) -> RideLockGuard<'_> {
        let mutex = self
            .locks
            .entry(ride_id.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;

        RideLockGuard {
            locks: &self.locks,
            ride_id: ride_id.to_string(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for RideLockGuard<'_> {
    fn drop(&mut self) {
        // Map + this guard are the only references when nobody is waiting
        self.locks
            .remove_if(&self.ride_id, |_, mutex| Arc::strong_count(mutex) == 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_is_released_and_cleaned_up() {
        let locks = RideLocks::new();
        {
            let _guard = locks.lock("ride-1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_ride_is_serialized() {
        let locks = Arc::new(RideLocks::new());
        let guard = locks.lock("ride-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("ride-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_rides_do_not_block() {
        let locks = RideLocks::new();
        let _a = locks.lock("ride-1").await;
        let _b = locks.lock("ride-2").await;
        assert_eq!(locks.len(), 2);
    }
}
