mod common;
use anyhow::Result;
use common::*;

use txstore::{Notification, OperationKind, Store, TransactionManager, TransactionOptions, TransactionStatus};

/// The canonical scenario: a rolled-back value must never reach an observer
#[tokio::test]
async fn test_rollback_is_never_observed() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);

    store.set_state(CounterPatch::count(1));
    store.set_state(CounterPatch::count(2));

    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    // replayed synchronously on subscribe
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![2]);

    let ctx = store.begin();
    store.set_state(CounterPatch::count(99));
    assert_eq!(store.get_state().count, 99);
    store.rollback_transaction(&ctx)?;

    assert_eq!(store.get_state().count, 2);
    assert_eq!(check().iter().map(|c| c.count).collect::<Vec<_>>(), vec![2]);
    assert_eq!(ctx.status(), TransactionStatus::RolledBack);
    assert!(ctx.end_time().is_some());
    assert!(manager.active_transactions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sequential_merges_and_reset() -> Result<()> {
    let store = Store::new(Counter::default(), &TransactionManager::new());

    store.set_state(CounterPatch::count(5));
    store.set_state(CounterPatch::label("taps"));
    store.set_state(CounterPatch::count(6));
    assert_eq!(store.get_state(), Counter { count: 6, label: "taps".to_owned() });

    store.reset_state();
    assert_eq!(store.get_state(), Counter::default());

    // the initial value is kept apart from the live state
    store.set_state(CounterPatch::count(7));
    store.reset_state();
    assert_eq!(store.get_state(), Counter::default());
    Ok(())
}

#[tokio::test]
async fn test_commit_publishes_exactly_what_the_body_set() -> Result<()> {
    let store = Store::new(Counter::default(), &TransactionManager::new());
    let (state_watcher, check) = watcher::<Counter>();
    let _subscription = store.subscribe(state_watcher);
    check();

    let ctx = store.begin_transaction(TransactionOptions::default());
    store.set_state(CounterPatch::count(1));
    store.set_state(CounterPatch::count(2));
    store.set_state(CounterPatch::label("done"));
    assert!(check().is_empty(), "nothing is published while the transaction is open");

    store.commit_transaction(&ctx)?;
    assert_eq!(check(), vec![Counter { count: 2, label: "done".to_owned() }]);
    assert_eq!(store.get_state(), Counter { count: 2, label: "done".to_owned() });
    Ok(())
}

#[tokio::test]
async fn test_execute_transaction_logs_resulting_state() -> Result<()> {
    let manager = TransactionManager::new();
    let store = Store::new(Counter::default(), &manager);

    let count = store
        .execute_transaction(
            |_| {
                let next = store.get_state().count + 10;
                store.set_state(CounterPatch::count(next));
                async move { Ok::<_, anyhow::Error>(next) }
            },
            TransactionOptions::default(),
        )
        .await?;
    assert_eq!(count, 10);

    let logs = store.transaction_logs();
    assert_eq!(logs.len(), 1);
    let operation = &logs[0].operations[0];
    assert_eq!(operation.kind, OperationKind::Update);
    assert_eq!(operation.target, "state");
    assert_eq!(operation.data, Some(serde_json::json!({"count": 10, "label": "clicks"})));
    assert_eq!(manager.transaction_log(logs[0].transaction_id), Some(logs[0].clone()));

    manager.clear_transaction_logs();
    assert!(store.transaction_logs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unsubscribe_and_close() -> Result<()> {
    let store = Store::new(Counter::default(), &TransactionManager::new());
    let (state_watcher, check) = watcher::<Counter>();
    let subscription = store.subscribe(state_watcher);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _channel = store.subscribe(tx);

    subscription.unsubscribe();
    subscription.unsubscribe();
    assert!(subscription.closed());

    store.set_state(CounterPatch::count(1));
    store.close();
    store.set_state(CounterPatch::count(2));

    assert_eq!(check(), vec![Counter::default()]);
    let mut received = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        received.push(notification);
    }
    assert_eq!(received.len(), 3);
    assert!(matches!(&received[0], Notification::Next(c) if c.count == 0));
    assert!(matches!(&received[1], Notification::Next(c) if c.count == 1));
    assert!(matches!(&received[2], Notification::Complete));
    assert!(store.is_closed());
    Ok(())
}
