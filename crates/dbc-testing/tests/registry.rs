//! Process-wide registry tests against the mock connection manager.
//!
//! Run with:
//!   cargo test -p dbc-testing --test registry

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dbc::{Database, Error, PoolConfig, Registry};
use dbc_testing::{MockManager, MockResponse};

async fn open(manager: MockManager) -> dbc::Result<Database<MockManager>> {
    Database::from_manager(PoolConfig::new().min_connections(2).max_connections(4), manager).await
}

fn counting_registry(manager: &MockManager, inits: &Arc<AtomicUsize>) -> Registry<MockManager> {
    let manager = manager.clone();
    let inits = Arc::clone(inits);
    Registry::new(move || {
        inits.fetch_add(1, Ordering::SeqCst);
        open(manager.clone())
    })
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_use_initializes_once() {
    let manager = MockManager::builder()
        .with_connect_delay(Duration::from_millis(50))
        .build();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(counting_registry(&manager, &inits));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get().await.map(|db| db.status().total) })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(manager.opened(), 2);
    assert!(registry.is_initialized().await);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initialization_leaves_registry_empty() {
    let manager = MockManager::new();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);

    manager.fail_next_connects(1);
    let err = registry.get().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert!(!registry.is_initialized().await);

    let db = registry.get().await.unwrap();
    assert_eq!(db.status().total, 2);
    assert_eq!(inits.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_instances_share_one_pool() {
    let manager = MockManager::builder()
        .with_response("SELECT 1", MockResponse::scalar_int(1))
        .build();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);

    let first = registry.get().await.unwrap();
    let _lease = first.acquire().await.unwrap();

    let second = registry.get().await.unwrap();
    assert_eq!(second.status().in_use, 1);
    assert_eq!(second.query("SELECT 1", &[]).await.unwrap().scalar::<i32>().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_init_uses_given_initializer() {
    let manager = MockManager::new();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);

    let other = MockManager::new();
    let db = registry.get_or_init(|| open(other.clone())).await.unwrap();
    assert_eq!(db.status().total, 2);
    assert_eq!(other.opened(), 2);

    // Already initialized: neither initializer runs again.
    registry.get().await.unwrap();
    assert_eq!(inits.load(Ordering::SeqCst), 0);
    assert_eq!(manager.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_held_instance() {
    let manager = MockManager::new();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);

    let db = registry.get().await.unwrap();
    registry.shutdown().await;

    assert!(db.is_closed());
    assert_eq!(manager.open_now(), 0);

    // The closed instance stays in place instead of being rebuilt.
    let again = registry.get().await.unwrap();
    assert!(again.is_closed());
    assert!(matches!(again.query("SELECT 1", &[]).await, Err(Error::PoolClosed)));
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_use() {
    let manager = MockManager::new();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);

    registry.shutdown().await;
    assert!(matches!(registry.get().await, Err(Error::PoolClosed)));
    assert_eq!(inits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_replace_installs_new_instance() {
    let manager = MockManager::new();
    let inits = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry(&manager, &inits);
    registry.shutdown().await;

    let replacement = MockManager::new();
    let previous = registry.replace(open(replacement.clone()).await.unwrap()).await;
    assert!(previous.is_none());

    let db = registry.get().await.unwrap();
    assert!(!db.is_closed());
    assert_eq!(replacement.opened(), 2);

    let old = registry
        .replace(open(MockManager::new()).await.unwrap())
        .await
        .unwrap();
    // Replacing hands the old instance back without closing it.
    assert!(!old.is_closed());
    old.shutdown().await;
    assert_eq!(replacement.open_now(), 0);
}
