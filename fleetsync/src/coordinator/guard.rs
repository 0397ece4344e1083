//! Per-account single-flight refresh guard.
//!
//! A plain flag rather than a queue: the periodic loop uses
//! [`RefreshGuard::try_acquire`] and drops its tick when the flag is taken.
//! Action confirmations use [`RefreshGuard::acquire`], which waits for the
//! running refresh to finish instead of being dropped.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct RefreshGuard {
    busy: AtomicBool,
    released: Notify,
}

impl RefreshGuard {
    /// Take the guard if no refresh is running.
    pub(crate) fn try_acquire(&self) -> Option<RefreshPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit { guard: self })
    }

    /// Wait until the guard is free, then take it.
    pub(crate) async fn acquire(&self) -> RefreshPermit<'_> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            released.await;
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one refresh. Releases the guard on drop.
#[derive(Debug)]
pub(crate) struct RefreshPermit<'a> {
    guard: &'a RefreshGuard,
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
        self.guard.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let guard = RefreshGuard::default();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.try_acquire().is_none());
        assert!(guard.is_busy());

        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let guard = Arc::new(RefreshGuard::default());

        let holder = guard.clone();
        let handle = tokio::spawn(async move {
            let _permit = holder.try_acquire();
            tokio::time::sleep(Duration::from_secs(3)).await;
        });
        tokio::task::yield_now().await;
        assert!(guard.is_busy());

        let started = tokio::time::Instant::now();
        let _permit = guard.acquire().await;
        assert!(started.elapsed() >= Duration::from_secs(3));
        handle.await.unwrap();
    }
}
