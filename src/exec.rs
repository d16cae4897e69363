//! Single-flight executor for legacy calculator calls
//!
//! The kernel is not reentrant, so at most one bridge call may be in flight
//! per calculator instance. The executor owns a one-permit gate; a call holds
//! the permit for its whole duration and the runtime is yielded to both
//! before and after the call so queued request futures keep making progress
//! around the long numeric section.
//!
//! The permit is released by drop, which covers the cancellation path: a
//! caller that abandons its request frees the gate the moment its future is
//! dropped, and whatever bridge call was already running completes on its own.

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Serialises calculator calls and yields around them.
#[derive(Clone)]
pub struct CalcExecutor {
    gate: Arc<Semaphore>,
}

impl CalcExecutor {
    /// A fresh gate admitting one call at a time.
    pub fn new() -> Self {
        Self { gate: Arc::new(Semaphore::new(1)) }
    }

    /// Run `call` under the gate. The future is not polled until the permit
    /// is held, and the yield after the call happens on the error path too
    /// (the output is an ordinary value by then).
    pub async fn run<T>(&self, call: impl std::future::Future<Output = T>) -> T {
        let _permit = self.gate.acquire().await.expect("calculator gate is never closed");
        tokio::task::yield_now().await;
        let out = call.await;
        tokio::task::yield_now().await;
        out
    }
}

impl Default for CalcExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn calls_never_overlap() {
        let exec = CalcExecutor::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let exec = exec.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                exec.run(async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_releases_the_gate() {
        let exec = CalcExecutor::new();
        let (_tx, rx) = tokio::sync::oneshot::channel::<()>();

        let held = exec.clone();
        let hung = tokio::spawn(async move {
            held.run(async {
                let _ = rx.await;
            })
            .await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        hung.abort();
        let _ = hung.await;

        // The permit must be free again for the next caller.
        tokio::time::timeout(Duration::from_secs(1), exec.run(async {}))
            .await
            .expect("gate was not released on cancellation");
    }
}
