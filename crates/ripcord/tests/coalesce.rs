// Copyright (c) The Ripcord Project Authors.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for request coalescing and result caching using only
//! public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use ripcord::{MemoryCache, SingleFlight, cached};

#[tokio::test(start_paused = true)]
async fn coalesced_callers_share_one_execution_and_result() {
    let flight = Arc::new(SingleFlight::<String, Result<String, String>>::new());
    let invocations = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let flight = Arc::clone(&flight);
        let invocations = Arc::clone(&invocations);
        tasks.push(tokio::spawn(async move {
            flight
                .execute("user:42".to_string(), || async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok("profile".to_string())
                })
                .await
        }));
    }

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "profile");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(flight.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn cache_inside_ttl_skips_work_and_expires_after() {
    let cache: MemoryCache<&str, u32> = MemoryCache::new();
    let invocations = AtomicU32::new(0);
    let work = || async {
        invocations.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>(7)
    };

    assert_eq!(cached(&cache, "key", Duration::from_millis(100), work).await.unwrap(), 7);

    tokio::time::advance(Duration::from_millis(50)).await;
    assert_eq!(cached(&cache, "key", Duration::from_millis(100), work).await.unwrap(), 7);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(cached(&cache, "key", Duration::from_millis(100), work).await.unwrap(), 7);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn single_flight_in_front_of_cache_deduplicates_misses() {
    let flight = Arc::new(SingleFlight::<u32, Result<u32, String>>::new());
    let cache = Arc::new(MemoryCache::<u32, u32>::new());
    let invocations = Arc::new(AtomicU32::new(0));

    let lookup = |key: u32| {
        let flight = Arc::clone(&flight);
        let cache = Arc::clone(&cache);
        let invocations = Arc::clone(&invocations);
        async move {
            flight
                .execute(key, || async {
                    cached(cache.as_ref(), key, Duration::from_secs(60), || async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(key * 2)
                    })
                    .await
                })
                .await
        }
    };

    // Concurrent misses for the same key coalesce instead of racing the
    // non-atomic get-then-put.
    let (a, b, c) = tokio::join!(
        tokio::spawn(lookup(3)),
        tokio::spawn(lookup(3)),
        tokio::spawn(lookup(3))
    );
    assert_eq!(a.unwrap().unwrap(), 6);
    assert_eq!(b.unwrap().unwrap(), 6);
    assert_eq!(c.unwrap().unwrap(), 6);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    // A later call hits the cache without going through the work at all.
    assert_eq!(lookup(3).await.unwrap(), 6);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}
