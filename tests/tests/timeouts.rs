mod common;
use anyhow::{anyhow, Result};
use common::*;

use std::time::Duration;
use txstore::{Store, TransactionError, TransactionManager, TransactionOptions, TransactionStatus, TransactionTimeout};

fn short_timeout() -> TransactionOptions { TransactionOptions::default().with_timeout(Duration::from_millis(30)) }

#[tokio::test]
async fn test_watchdog_rolls_back_and_store_restores() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    let (timeout_watcher, timeouts) = watcher::<TransactionTimeout>();
    let _timeouts = manager.subscribe_timeouts(timeout_watcher);
    check();

    let ctx = store.begin_transaction(short_timeout());
    store.set_state(CounterPatch::count(42));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(ctx.status(), TransactionStatus::RolledBack);
    assert_eq!(ctx.timed_out(), Some(Duration::from_millis(30)));
    assert!(!manager.is_transaction_active(ctx.id()));
    assert_eq!(store.get_state(), Counter::default());
    assert!(check().iter().all(|c| c.count == 0), "the abandoned value is never published");

    let fired = timeouts();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].context.id(), ctx.id());

    // the caller finds out when it next touches the transaction
    assert_eq!(store.commit_transaction(&ctx), Err(TransactionError::Timeout { id: ctx.id(), timeout: Duration::from_millis(30) }));
    assert!(matches!(store.rollback_transaction(&ctx), Err(TransactionError::Timeout { .. })));
    Ok(())
}

#[tokio::test]
async fn test_finished_transaction_is_left_alone_by_watchdog() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);
    let (timeout_watcher, timeouts) = watcher::<TransactionTimeout>();
    let _timeouts = manager.subscribe_timeouts(timeout_watcher);

    let ctx = store.begin_transaction(short_timeout());
    store.set_state(CounterPatch::count(1));
    store.commit_transaction(&ctx)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ctx.status(), TransactionStatus::Committed);
    assert_eq!(ctx.timed_out(), None);
    assert_eq!(store.get_state().count, 1);
    assert!(timeouts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_slow_body_fails_with_timeout() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);

    let result: Result<()> = store
        .execute_transaction(
            |_| {
                store.set_state(CounterPatch::count(7));
                async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok(())
                }
            },
            short_timeout(),
        )
        .await;

    let err = result.err().ok_or_else(|| anyhow!("a body outliving its timeout must fail"))?;
    assert!(matches!(err.downcast_ref::<TransactionError>(), Some(TransactionError::Timeout { .. })));
    assert_eq!(store.get_state(), Counter::default());
    assert!(store.transaction_logs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_timeout_only_restores_the_owning_store() -> Result<()> {
    let manager = TransactionManager::new();
    let first = Store::new(Counter::default(), &manager);
    let second = Store::new(Counter::default(), &manager);

    second.set_state(CounterPatch::count(3));
    let _ctx = first.begin_transaction(short_timeout());
    first.set_state(CounterPatch::count(9));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(first.get_state().count, 0);
    assert_eq!(second.get_state().count, 3);
    Ok(())
}

/// A body keeps running after the watchdog rolled its transaction back; what it writes from
/// then on must never reach observers.
#[tokio::test]
async fn test_writes_after_timeout_are_never_published() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    check();

    let result: Result<()> = store
        .execute_transaction(
            |_| {
                let store = store.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    store.set_state(CounterPatch::count(666));
                    Ok(())
                }
            },
            short_timeout(),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(store.get_state().count, 0);
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![0]);
    assert!(manager.active_transactions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_body_does_not_block_publication() -> Result<()> {
    let store = Store::new(Counter::default(), &TransactionManager::new());
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    check();

    let pending = store.execute_transaction(
        |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>(())
        },
        short_timeout(),
    );
    // dropped part way through the body
    assert!(tokio::time::timeout(Duration::from_millis(80), pending).await.is_err());

    store.set_state(CounterPatch::count(1));
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![1]);
    Ok(())
}
