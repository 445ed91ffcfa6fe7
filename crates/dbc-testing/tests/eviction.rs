//! Idle eviction and lifetime tests driven by a paused clock.
//!
//! Run with:
//!   cargo test -p dbc-testing --test eviction

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use dbc::{Database, PoolConfig};
use dbc_testing::MockManager;

fn config(min: u32, max: u32) -> PoolConfig {
    PoolConfig::new()
        .min_connections(min)
        .max_connections(max)
        .idle_timeout(Duration::from_secs(3))
        .max_lifetime(Duration::ZERO)
        .reaper_interval(Duration::from_millis(500))
}

async fn settle(duration: Duration) {
    tokio::time::advance(duration).await;
    // Let the reaper run its pass.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_connections_evicted_down_to_min() {
    let manager = MockManager::new();
    let db = Database::from_manager(config(2, 6), manager.clone()).await.unwrap();

    let leases: Vec<_> = {
        let mut leases = Vec::new();
        for _ in 0..6 {
            leases.push(db.acquire().await.unwrap());
        }
        leases
    };
    drop(leases);
    assert_eq!(db.status().available, 6);

    settle(Duration::from_secs(2)).await;
    assert_eq!(db.status().total, 6, "nothing is idle long enough yet");

    settle(Duration::from_secs(2)).await;
    assert_eq!(db.status().total, 2);
    assert_eq!(manager.open_now(), 2);

    // Further passes never go below the minimum.
    settle(Duration::from_secs(10)).await;
    assert_eq!(db.status().total, 2);
}

#[tokio::test(start_paused = true)]
async fn test_leased_connections_never_evicted() {
    let manager = MockManager::new();
    let db = Database::from_manager(config(0, 2), manager.clone()).await.unwrap();

    let held = db.acquire().await.unwrap();
    let idle = db.acquire().await.unwrap();
    drop(idle);

    settle(Duration::from_secs(5)).await;
    assert_eq!(db.status().total, 1);
    assert_eq!(db.status().in_use, 1);

    drop(held);
    assert_eq!(db.status().available, 1);
}

#[tokio::test(start_paused = true)]
async fn test_killed_connections_replaced_after_restart() {
    let manager = MockManager::new();
    let db = Database::from_manager(config(2, 4), manager.clone()).await.unwrap();

    manager.kill_connections();
    // Both dead idle connections are dropped and a new one is opened.
    let lease = db.acquire().await.unwrap();
    assert!(!lease.is_dead());
    assert_eq!(manager.opened(), 3);
    assert_eq!(db.status().total, 1);

    // The reaper brings the pool back to its minimum.
    settle(Duration::from_secs(1)).await;
    assert_eq!(db.status().total, 2);
    assert_eq!(manager.opened(), 4);
    assert_eq!(manager.open_now(), 2);
    drop(lease);
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_limit_replaces_connections() {
    let manager = MockManager::new();
    let config = config(1, 2)
        .idle_timeout(Duration::ZERO)
        .max_lifetime(Duration::from_secs(5));
    let db = Database::from_manager(config, manager.clone()).await.unwrap();

    settle(Duration::from_secs(6)).await;

    assert_eq!(manager.opened(), 2);
    assert_eq!(manager.open_now(), 1);
    assert_eq!(db.status().total, 1);
}
