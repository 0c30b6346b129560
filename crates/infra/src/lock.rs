//! Per-group serialization of reconciliation passes.
//!
//! At most one pass per [`GroupKey`] runs at a time. A request arriving while
//! a pass is in flight does not queue: it is merged into a single pending slot
//! (see [`Coalesce`]), and the holder keeps draining that slot until it is
//! empty before releasing the group.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use stocklink_inventory::GroupKey;

/// Merge a newer pending request into an older one.
pub trait Coalesce {
    fn coalesce(&mut self, newer: Self);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// This caller held the group and ran `passes` passes (its own plus drained ones).
    Ran { passes: usize },
    /// Another caller holds the group; the request was merged into its pending slot.
    Coalesced,
}

pub struct GroupLock<T> {
    // Present key = group in flight; value = pending request.
    slots: Mutex<HashMap<GroupKey, Option<T>>>,
}

impl<T: Coalesce> GroupLock<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_flight(&self, key: &GroupKey) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Run `pass` for `request`, or hand `request` to the current holder.
    pub async fn run<F, Fut>(&self, key: &GroupKey, request: T, mut pass: F) -> LockOutcome
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let Some(mut next) = self.acquire(key, request) else {
            debug!(group = %key, "pass in flight; coalesced into pending slot");
            return LockOutcome::Coalesced;
        };

        let mut guard = Release {
            lock: self,
            key,
            armed: true,
        };
        let mut passes = 0;
        loop {
            pass(next).await;
            passes += 1;
            match self.take_pending(key) {
                Some(pending) => next = pending,
                None => break,
            }
        }
        guard.armed = false;

        LockOutcome::Ran { passes }
    }

    /// Hands the request back when the caller now holds the group; otherwise
    /// merges it into the holder's pending slot.
    fn acquire(&self, key: &GroupKey, request: T) -> Option<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get_mut(key) {
            Some(Some(pending)) => {
                pending.coalesce(request);
                None
            }
            Some(slot) => {
                *slot = Some(request);
                None
            }
            None => {
                slots.insert(key.clone(), None);
                Some(request)
            }
        }
    }

    /// Take the pending request, or release the group when there is none.
    fn take_pending(&self, key: &GroupKey) -> Option<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = slots.get_mut(key).and_then(Option::take);
        if pending.is_none() {
            slots.remove(key);
        }
        pending
    }
}

impl<T: Coalesce> Default for GroupLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the group if a pass panics or the holder is cancelled mid-pass.
struct Release<'a, T> {
    lock: &'a GroupLock<T>,
    key: &'a GroupKey,
    armed: bool,
}

impl<T> Drop for Release<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.lock.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Some(_)) = slots.remove(self.key) {
            warn!(group = %self.key, "pass aborted; pending request dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use stocklink_core::TenantId;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Ids(Vec<u32>);

    impl Coalesce for Ids {
        fn coalesce(&mut self, newer: Self) {
            self.0.extend(newer.0);
        }
    }

    fn key() -> GroupKey {
        GroupKey::new(TenantId::new(), "m".into(), "l".into())
    }

    #[tokio::test]
    async fn uncontended_run_executes_once() {
        let lock = GroupLock::new();
        let key = key();
        let mut seen = Vec::new();

        let outcome = lock
            .run(&key, Ids(vec![1]), |ids| {
                seen.push(ids);
                async {}
            })
            .await;

        assert_eq!(outcome, LockOutcome::Ran { passes: 1 });
        assert_eq!(seen, vec![Ids(vec![1])]);
        assert!(!lock.in_flight(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_coalesce_into_one_extra_pass() {
        let lock = Arc::new(GroupLock::new());
        let key = key();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let holder = {
            let (lock, key, seen) = (lock.clone(), key.clone(), seen.clone());
            tokio::spawn(async move {
                lock.run(&key, Ids(vec![1]), |ids| {
                    let seen = seen.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        seen.lock().unwrap().push(ids);
                    }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(lock.in_flight(&key));
        for id in [2, 3] {
            let outcome = lock.run(&key, Ids(vec![id]), |_| async {}).await;
            assert_eq!(outcome, LockOutcome::Coalesced);
        }

        assert_eq!(holder.await.unwrap(), LockOutcome::Ran { passes: 2 });
        assert_eq!(*seen.lock().unwrap(), vec![Ids(vec![1]), Ids(vec![2, 3])]);
        assert!(!lock.in_flight(&key));
    }

    #[tokio::test]
    async fn cancelled_holder_releases_the_group() {
        let lock = GroupLock::new();
        let key = key();

        let pending = lock.run(&key, Ids(vec![1]), |_| std::future::pending::<()>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert!(!lock.in_flight(&key));

        let outcome = lock.run(&key, Ids(vec![2]), |_| async {}).await;
        assert_eq!(outcome, LockOutcome::Ran { passes: 1 });
    }
}
