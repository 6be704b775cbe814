//! Selection capacity enforcement.
//!
//! Every selection set has a maximum total feature count. The
//! [`CapacityLimiter`] tracks the running total per set; each engine
//! operation opens a [`CapacityScope`] through which all of its reserves
//! flow. Reserves are synchronous and safe to call from concurrently
//! settling sources: the keyed entry guard serializes the
//! read-modify-write, and the scope fires the capacity-exceeded
//! notification exactly once per operation no matter how many sources
//! trip it.

use crate::store::SetKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives the capacity-exceeded notification.
///
/// Fired at most once per engine operation, fire-and-forget. Host
/// applications typically surface a non-blocking warning toast.
pub trait CapacityNotifier: Send + Sync + 'static {
    /// A selection set hit its record cap and the batch was truncated.
    fn capacity_exceeded(&self, key: &SetKey, max_records: usize);
}

/// [`CapacityNotifier`] that discards notifications.
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

impl CapacityNotifier for NullNotifier {
    fn capacity_exceeded(&self, _key: &SetKey, _max_records: usize) {}
}

/// Tracks selected-feature totals per selection set.
#[derive(Debug, Default)]
pub struct CapacityLimiter {
    totals: DashMap<SetKey, usize>,
}

impl CapacityLimiter {
    /// Creates a limiter with no tracked sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current total for a set.
    pub fn total(&self, key: &SetKey) -> usize {
        self.totals.get(key).map(|t| *t).unwrap_or(0)
    }

    /// Returns `count` capacity to a set (entry shrank or was dropped).
    pub fn release(&self, key: &SetKey, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(mut total) = self.totals.get_mut(key) {
            *total = total.saturating_sub(count);
        }
    }

    /// Forgets a set entirely (set cleared or torn down).
    pub fn reset(&self, key: &SetKey) {
        self.totals.remove(key);
    }

    /// Opens an operation-scoped reservation window.
    ///
    /// All reserves of one externally visible operation must go through
    /// the returned scope so the exceeded notification fires once.
    pub fn begin(
        self: Arc<Self>,
        key: SetKey,
        max_records: usize,
        notifier: Arc<dyn CapacityNotifier>,
    ) -> CapacityScope {
        CapacityScope {
            limiter: self,
            key,
            max_records,
            notifier,
            notified: AtomicBool::new(false),
        }
    }
}

/// Outcome of a single reserve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// How many of the requested features fit; the caller truncates its
    /// batch to this length.
    pub allowed: usize,
    /// True if the request did not fit entirely.
    pub exceeded: bool,
}

/// Reservation window for one engine operation.
pub struct CapacityScope {
    limiter: Arc<CapacityLimiter>,
    key: SetKey,
    max_records: usize,
    notifier: Arc<dyn CapacityNotifier>,
    notified: AtomicBool,
}

impl CapacityScope {
    /// Reserves room for `requested` additional features.
    ///
    /// Atomic with respect to concurrently settling sources: the keyed
    /// entry guard holds the shard lock for the read-modify-write. When
    /// the request does not fit, the allowed prefix length is returned
    /// and the notifier fires if it has not already for this scope.
    pub fn reserve(&self, requested: usize) -> Reservation {
        let allowed = {
            let mut total = self.limiter.totals.entry(self.key.clone()).or_insert(0);
            let remaining = self.max_records.saturating_sub(*total);
            let allowed = requested.min(remaining);
            *total += allowed;
            allowed
        };

        let exceeded = allowed < requested;
        if exceeded && !self.notified.swap(true, Ordering::SeqCst) {
            self.notifier.capacity_exceeded(&self.key, self.max_records);
        }

        Reservation { allowed, exceeded }
    }

    /// Returns true if the set has reached its record cap.
    pub fn is_full(&self) -> bool {
        self.limiter.total(&self.key) >= self.max_records
    }

    /// Returns true if this scope has fired the exceeded notification.
    pub fn notified(&self) -> bool {
        self.notified.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl CapacityNotifier for CountingNotifier {
        fn capacity_exceeded(&self, _key: &SetKey, _max_records: usize) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn key() -> SetKey {
        SetKey::new("map", "default")
    }

    #[test]
    fn test_reserve_within_capacity() {
        let limiter = Arc::new(CapacityLimiter::new());
        let scope = Arc::clone(&limiter).begin(key(), 100, Arc::new(NullNotifier));

        let res = scope.reserve(40);
        assert_eq!(res.allowed, 40);
        assert!(!res.exceeded);
        assert_eq!(limiter.total(&key()), 40);
        assert!(!scope.is_full());
    }

    #[test]
    fn test_reserve_truncates_at_capacity() {
        let limiter = Arc::new(CapacityLimiter::new());
        let notifier = Arc::new(CountingNotifier::default());
        let scope = Arc::clone(&limiter).begin(key(), 100, notifier.clone());

        assert_eq!(scope.reserve(95).allowed, 95);

        let res = scope.reserve(10);
        assert_eq!(res.allowed, 5);
        assert!(res.exceeded);
        assert_eq!(limiter.total(&key()), 100);
        assert!(scope.is_full());
        assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notification_fires_once_per_scope() {
        let limiter = Arc::new(CapacityLimiter::new());
        let notifier = Arc::new(CountingNotifier::default());
        let scope = Arc::clone(&limiter).begin(key(), 10, notifier.clone());

        scope.reserve(20);
        scope.reserve(5);
        scope.reserve(1);

        assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
        assert!(scope.notified());
    }

    #[test]
    fn test_separate_scopes_notify_separately() {
        let limiter = Arc::new(CapacityLimiter::new());
        let notifier = Arc::new(CountingNotifier::default());

        let first = Arc::clone(&limiter).begin(key(), 10, notifier.clone());
        first.reserve(20);

        let second = Arc::clone(&limiter).begin(key(), 10, notifier.clone());
        second.reserve(1);

        assert_eq!(notifier.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_and_reset() {
        let limiter = Arc::new(CapacityLimiter::new());
        let scope = Arc::clone(&limiter).begin(key(), 100, Arc::new(NullNotifier));

        scope.reserve(60);
        limiter.release(&key(), 25);
        assert_eq!(limiter.total(&key()), 35);

        // Releasing more than tracked saturates at zero
        limiter.release(&key(), 1000);
        assert_eq!(limiter.total(&key()), 0);

        scope.reserve(10);
        limiter.reset(&key());
        assert_eq!(limiter.total(&key()), 0);
    }

    #[test]
    fn test_totals_are_per_set() {
        let limiter = Arc::new(CapacityLimiter::new());
        let other = SetKey::new("map", "other");

        let scope_a = Arc::clone(&limiter).begin(key(), 100, Arc::new(NullNotifier));
        let scope_b = Arc::clone(&limiter).begin(other.clone(), 100, Arc::new(NullNotifier));

        scope_a.reserve(30);
        scope_b.reserve(70);

        assert_eq!(limiter.total(&key()), 30);
        assert_eq!(limiter.total(&other), 70);
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_exceed_max() {
        let limiter = Arc::new(CapacityLimiter::new());
        let scope = Arc::new(Arc::clone(&limiter).begin(key(), 100, Arc::new(NullNotifier)));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let scope = Arc::clone(&scope);
            handles.push(tokio::spawn(async move { scope.reserve(10).allowed }));
        }

        let mut granted = 0;
        for handle in handles {
            granted += handle.await.unwrap();
        }

        assert_eq!(granted, 100);
        assert_eq!(limiter.total(&key()), 100);
    }
}
