//! Counting gate with a quiescence signal (§4.1).
//!
//! `acquire`/`release` bound concurrency to `capacity`; `join` resolves once
//! every acquired permit has been released. Unlike a plain semaphore, the
//! gate also tracks whether anything is currently outstanding so a caller
//! can wait for a whole batch of work to drain without knowing in advance
//! how many `acquire` calls will happen.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

struct Inner {
    semaphore: Arc<Semaphore>,
    outstanding: AtomicUsize,
    empty: Notify,
}

/// A `BoundedGate` permit. Releases automatically on drop, so cancellation
/// of the task holding it still releases exactly once.
pub struct Permit {
    inner: Arc<Inner>,
    _semaphore_permit: OwnedSemaphorePermit,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.empty.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct BoundedGate {
    inner: Arc<Inner>,
}

impl BoundedGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                outstanding: AtomicUsize::new(0),
                empty: Notify::new(),
            }),
        }
    }

    /// Blocks until one of `capacity` permits is free, then marks it
    /// outstanding. The returned [`Permit`] releases the slot when dropped.
    #[allow(clippy::expect_used)]
    pub async fn acquire(&self) -> Permit {
        // acquire_owned never closes the semaphore from this side, so the
        // only error case (Closed) cannot happen.
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("BoundedGate semaphore is never closed");
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        Permit { inner: self.inner.clone(), _semaphore_permit: permit }
    }

    /// Resolves once the outstanding count has returned to zero. Does not
    /// prevent new `acquire` calls from racing in afterwards; it observes a
    /// point of quiescence, not an upper bound on future work.
    pub async fn join(&self) {
        loop {
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            let notified = self.inner.empty.notified();
            // Re-check after subscribing so a notification that fired
            // between the load above and this point isn't missed.
            if self.inner.outstanding.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_release_conserves_count() {
        let gate = BoundedGate::new(2);
        let p1 = gate.acquire().await;
        assert_eq!(gate.outstanding(), 1);
        let p2 = gate.acquire().await;
        assert_eq!(gate.outstanding(), 2);
        drop(p1);
        assert_eq!(gate.outstanding(), 1);
        drop(p2);
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn join_resolves_after_drain() {
        let gate = BoundedGate::new(4);
        let permits: Vec<_> = futures::future::join_all((0..4).map(|_| gate.acquire())).await;
        let gate2 = gate.clone();
        let joined = tokio::spawn(async move { gate2.join().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joined.is_finished());
        drop(permits);
        joined.await.unwrap();
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn join_returns_immediately_when_already_empty() {
        let gate = BoundedGate::new(4);
        tokio::time::timeout(Duration::from_millis(50), gate.join())
            .await
            .expect("join should resolve immediately");
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let gate = BoundedGate::new(1);
        let _p1 = gate.acquire().await;
        let gate2 = gate.clone();
        let waiting = tokio::spawn(async move { gate2.acquire().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
    }
}
