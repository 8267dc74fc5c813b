// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

//! Coalescing of concurrent identical calls.
//!
//! [`SingleFlight`] guarantees at most one concurrent execution per key: the
//! first caller for a key becomes the leader and runs the work, concurrent
//! callers for the same key attach to it and receive a clone of the leader's
//! result. If the leader is cancelled before publishing, one of the waiting
//! followers is promoted and runs its own work, so a cancelled leader never
//! strands its followers.
//!
//! Once a key's computation completes the registry entry is gone; the next
//! call for that key starts fresh. Memoization across completed calls is
//! [`cache`][crate::cache]'s job, not this one's.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Shared result slot for one in-flight key.
///
/// The async mutex doubles as the leader election: whoever locks the slot
/// and finds it empty runs the work while still holding the lock, so
/// followers block on the mutex until a value is published or the leader
/// goes away.
#[derive(Debug)]
struct Call<T> {
    slot: tokio::sync::Mutex<Option<T>>,
}

/// Registry coalescing concurrent calls by key.
///
/// The registry only tracks in-flight work: entries are weak, so abandoned
/// or completed calls cost nothing. Share one instance per deduplicated
/// operation.
#[derive(Debug)]
pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Weak<Call<T>>>>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Runs `op` for `key`, or attaches to an identical in-flight call.
    ///
    /// All coalesced callers observe a clone of the same value. With a
    /// `Result` value type this includes the error side, so one failure is
    /// shared by every attached caller rather than triggering a thundering
    /// herd of its own.
    pub async fn execute<F, Fut>(&self, key: K, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = {
            let mut calls = self.calls.lock();
            match calls.get(&key).and_then(Weak::upgrade) {
                Some(call) => call,
                None => {
                    let call = Arc::new(Call {
                        slot: tokio::sync::Mutex::new(None),
                    });
                    calls.insert(key.clone(), Arc::downgrade(&call));
                    call
                }
            }
        };

        let mut slot = call.slot.lock().await;
        if let Some(value) = slot.as_ref() {
            return value.clone();
        }

        // Leader (possibly a promoted follower). The entry is removed while
        // the slot lock is still held, so no new caller can observe the key
        // as in-flight after its value is published.
        let value = op().await;
        *slot = Some(value.clone());
        self.calls.lock().remove(&key);
        value
    }

    /// Number of keys currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        let mut calls = self.calls.lock();
        calls.retain(|_, call| call.strong_count() > 0);
        calls.len()
    }
}
