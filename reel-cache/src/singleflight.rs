//! Single-flight fetch coalescing.
//!
//! Concurrent callers asking for the same key attach to one underlying
//! fetch: the first caller becomes the leader and spawns the fetch, later
//! callers subscribe to the leader's broadcast channel. Everyone receives a
//! clone of the same result, success or failure, and nothing is retained
//! once the flight lands.
//!
//! The fetch runs as a detached task, so a caller that disappears mid-flight
//! (client disconnect) does not abort it — the result still lands in the
//! cache for the next request.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::error::CacheError;

type FlightMap<K, V> = Arc<Mutex<HashMap<K, broadcast::Sender<Result<V, CacheError>>>>>;

/// Coalesces concurrent fetches per key.
pub struct SingleFlight<K, V> {
    inflight: FlightMap<K, V>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create an empty single-flight gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetches currently in flight.
    pub fn len(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    /// Whether no fetches are in flight.
    pub fn is_empty(&self) -> bool {
        self.inflight.lock().unwrap().is_empty()
    }

    /// Run `fetch` for `key`, or wait on the flight already running for it.
    ///
    /// The invariant this buys: at most one `fetch` per key is executing at
    /// any instant, across all concurrent callers.
    pub async fn run<F>(&self, key: K, fetch: F) -> Result<V, CacheError>
    where
        F: std::future::Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let mut rx = {
            let mut map = self.inflight.lock().unwrap();
            if let Some(tx) = map.get(&key) {
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                map.insert(key.clone(), tx.clone());

                let inflight = Arc::clone(&self.inflight);
                tokio::spawn(async move {
                    let mut guard = RemoveOnDrop {
                        inflight,
                        key: Some(key),
                    };
                    let result = fetch.await;
                    // Unregister before broadcasting so a caller arriving
                    // after the send starts a fresh flight instead of
                    // subscribing to a channel that already fired.
                    guard.remove_now();
                    let _ = tx.send(result);
                });

                rx
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(CacheError::FlightInterrupted),
        }
    }
}

/// Unregisters a flight even if the fetch panics.
struct RemoveOnDrop<K: Eq + Hash, V> {
    inflight: FlightMap<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> RemoveOnDrop<K, V> {
    fn remove_now(&mut self) {
        if let Some(key) = self.key.take() {
            self.inflight.lock().unwrap().remove(&key);
        }
    }
}

impl<K: Eq + Hash, V> Drop for RemoveOnDrop<K, V> {
    fn drop(&mut self) {
        self.remove_now();
    }
}
