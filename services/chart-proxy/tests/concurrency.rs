//! Single-flight and cancellation behaviour of the manifest cache

mod common;

use std::time::Duration;

use chart_proxy::Manifests;

use common::{Upstream, charts, manifest, tag};

const FOREVER: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn concurrent_misses_share_one_preparation() {
    let upstream = Upstream::new(charts());
    upstream.slow("charts/app", Duration::from_millis(50));
    let manifests = Manifests::shared(upstream.clone());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let manifests = manifests.clone();
            tokio::spawn(async move { manifests.get("charts/app", &tag("1.0.0")).await })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        let manifest = task.unwrap().unwrap();
        assert_eq!(manifest.blob().as_ref(), b"b");
    }
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn slow_miss_does_not_block_other_keys() {
    let upstream = Upstream::new(charts());
    upstream.slow("charts/slow", FOREVER);
    let manifests = Manifests::shared(upstream.clone());
    manifests.insert("charts/cached", tag("1.0.0"), manifest("cached"));

    let slow = {
        let manifests = manifests.clone();
        tokio::spawn(async move { manifests.get("charts/slow", &tag("1.0.0")).await })
    };
    upstream.started(1).await;

    // A hit in another repository
    let hit = tokio::time::timeout(
        Duration::from_secs(5),
        manifests.get("charts/cached", &tag("1.0.0")),
    )
    .await
    .expect("cache hit waited on a slow population")
    .unwrap();
    assert_eq!(hit.blob().as_ref(), b"cached");

    // A miss on another key
    let miss = tokio::time::timeout(
        Duration::from_secs(5),
        manifests.get("charts/fast", &tag("1.0.0")),
    )
    .await
    .expect("cache miss waited on a slow population")
    .unwrap();
    assert_eq!(miss.blob().as_ref(), b"fast");
    assert_eq!(upstream.calls(), 2);

    slow.abort();
}

#[tokio::test]
async fn abandoned_population_is_cancelled() {
    let upstream = Upstream::new(charts());
    upstream.slow("charts/slow", FOREVER);
    let manifests = Manifests::shared(upstream.clone());

    let waiter = {
        let manifests = manifests.clone();
        tokio::spawn(async move { manifests.get("charts/slow", &tag("1.0.0")).await })
    };
    upstream.started(1).await;
    assert!(!upstream.tokens()[0].is_cancelled());

    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    let token = upstream.tokens()[0].clone();
    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("population was not cancelled");
    assert!(manifests.cached("charts/slow", &tag("1.0.0")).is_none());
}

#[tokio::test]
async fn remaining_waiter_keeps_population_alive() {
    let upstream = Upstream::new(charts());
    upstream.slow("charts/slow", Duration::from_millis(200));
    let manifests = Manifests::shared(upstream.clone());

    let spawn = || {
        let manifests = manifests.clone();
        tokio::spawn(async move { manifests.get("charts/slow", &tag("1.0.0")).await })
    };
    let first = spawn();
    let second = spawn();
    upstream.started(1).await;

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let manifest = second.await.unwrap().unwrap();
    assert_eq!(manifest.blob().as_ref(), b"slow");
    assert_eq!(upstream.calls(), 1);
    assert!(!upstream.tokens()[0].is_cancelled());
}

#[tokio::test]
async fn population_after_cancellation_starts_fresh() {
    let upstream = Upstream::new(charts());
    upstream.slow("charts/slow", FOREVER);
    let manifests = Manifests::shared(upstream.clone());

    let waiter = {
        let manifests = manifests.clone();
        tokio::spawn(async move { manifests.get("charts/slow", &tag("1.0.0")).await })
    };
    upstream.started(1).await;
    waiter.abort();
    let _ = waiter.await;

    let retry = {
        let manifests = manifests.clone();
        tokio::spawn(async move { manifests.get("charts/slow", &tag("1.0.0")).await })
    };
    upstream.started(2).await;
    assert!(upstream.tokens()[0].is_cancelled());
    assert!(!upstream.tokens()[1].is_cancelled());

    retry.abort();
}
