mod common;
use anyhow::{anyhow, Result};
use common::*;

use std::time::Duration;
use txstore::{Store, TransactionError, TransactionManager, TransactionOptions};

#[tokio::test]
async fn test_nested_transactions_restore_the_outer() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    check();

    let outer = store.begin();
    store.set_state(CounterPatch::count(1));
    let inner = store.begin();
    assert_eq!(inner.parent(), Some(outer.id()));
    assert_eq!(manager.current_transaction(), Some(inner.clone()));

    store.set_state(CounterPatch::count(2));
    store.rollback_transaction(&inner)?;
    assert_eq!(store.get_state().count, 1);
    assert_eq!(manager.current_transaction(), Some(outer.clone()));
    assert!(check().is_empty(), "the outer transaction is still open");

    store.commit_transaction(&outer)?;
    assert_eq!(manager.current_transaction(), None);
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_stores_sharing_a_manager_share_bookkeeping() -> Result<()> {
    let manager = TransactionManager::new();
    let left = Store::new(Counter::default(), &manager);
    let right = Store::new(Counter::default(), &manager);

    let a = left.begin();
    let b = right.begin();
    assert_eq!(b.parent(), Some(a.id()));
    assert_eq!(manager.active_transactions().len(), 2);

    // each store only restores snapshots it took
    left.set_state(CounterPatch::count(5));
    right.set_state(CounterPatch::count(6));
    left.rollback_transaction(&b)?;
    assert_eq!(left.get_state().count, 5);
    assert_eq!(right.get_state().count, 6);

    right.commit_transaction(&a)?;
    assert!(manager.active_transactions().is_empty());
    assert!(matches!(left.commit_transaction(&a), Err(TransactionError::InvalidState(..))));
    Ok(())
}

/// Interleaved transactions on one store are not isolated from each other. Each snapshots the
/// state when it begins, so the later rollback of an earlier transaction puts back a value from
/// before a transaction that committed in the meantime.
#[tokio::test]
async fn test_interleaved_rollback_discards_later_commit() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    check();

    let slow_failure = store.execute_transaction(
        |_| {
            store.set_state(CounterPatch::count(1));
            async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Err::<(), _>(anyhow!("slow failure"))
            }
        },
        TransactionOptions::default(),
    );
    let fast_success = store.execute_transaction(
        |_| {
            store.set_state(CounterPatch::count(store.get_state().count + 1));
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, anyhow::Error>(())
            }
        },
        TransactionOptions::default(),
    );

    let (failed, succeeded) = tokio::join!(slow_failure, fast_success);
    assert!(failed.is_err());
    succeeded?;

    assert_eq!(store.get_state().count, 0);
    // neither intermediate value was ever published
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![0]);
    assert!(manager.active_transactions().is_empty());
    Ok(())
}
