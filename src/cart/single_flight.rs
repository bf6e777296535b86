//! Coalesces concurrent identical loads into one in-flight operation.
//!
//! Callers that arrive while a load for the same key is running await the
//! leader's result instead of issuing their own. If the leader fails, one of
//! the waiters takes over and retries; the error is not cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// A single-flight group keyed by string.
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `load` for `key`, sharing the result with every concurrent caller
    /// of the same key.
    pub async fn run<F, Fut, E>(&self, key: &str, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell.get_or_try_init(load).await.map(|value| value.clone());

        // Retire this flight so the next miss starts a fresh load. Only the
        // cell we joined is removed; a newer flight under the same key is
        // left in place.
        let mut inflight = self.inflight.lock().await;
        if let Some(current) = inflight.get(key) {
            if Arc::ptr_eq(current, &cell) {
                inflight.remove(key);
            }
        }

        result
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let flights = Arc::new(SingleFlight::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("user-1", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let flights = SingleFlight::<u64>::new();
        let a = flights.run("a", || async { Ok::<_, ()>(1) }).await;
        let b = flights.run("b", || async { Ok::<_, ()>(2) }).await;
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(2));
    }

    #[tokio::test]
    async fn sequential_calls_load_again() {
        let flights = SingleFlight::<u64>::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = flights
                .run("user-1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let flights = SingleFlight::<u64>::new();

        let first = flights.run("k", || async { Err::<u64, _>("boom") }).await;
        assert_eq!(first, Err("boom"));

        let second = flights.run("k", || async { Ok::<_, &str>(9) }).await;
        assert_eq!(second, Ok(9));
    }
}
