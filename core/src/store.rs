//! A typed state container with transactional mutation and change notification.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde::Serialize;
use tracing::{debug, warn};
use txstore_signals::{Broadcast, Fault, IntoObserver, Subscription};
use ulid::Ulid;

use crate::error::TransactionError;
use crate::merge::Merge;
use crate::transaction::{
    OperationKind, TransactionContext, TransactionId, TransactionLog, TransactionManager, TransactionOperation, TransactionOptions,
    TransactionTimeout,
};

/// The `target` recorded on the operations a store logs
pub const STATE_TARGET: &str = "state";

/// Bounds required of a store's state
pub trait State: Merge + Clone + Serialize + Send + Sync + 'static {}
impl<S> State for S where S: Merge + Clone + Serialize + Send + Sync + 'static {}

/// A transactional, observable state container.
///
/// Observers are only ever shown the state at a transaction boundary: after a commit or a
/// rollback, or after a `set_state`/`reset_state` made while none of this store's transactions
/// are open. Mutations made inside a transaction stay invisible to observers until it ends, and
/// are discarded entirely if it rolls back.
///
/// This is a visibility guarantee, not concurrency control. Two transactions that interleave
/// across await points each snapshot the state when they begin, and a rollback of the earlier one
/// restores its snapshot over whatever the later one committed.
///
/// Cloning yields another handle to the same store.
pub struct Store<S: State>(Arc<Inner<S>>);

impl<S: State> Clone for Store<S> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct Inner<S> {
    id: Ulid,
    state: RwLock<S>,
    initial: S,
    broadcast: Broadcast<S>,
    manager: TransactionManager,
    /// Transactions begun through this store that may still be pending
    open: Mutex<Vec<OpenTransaction>>,
    _timeouts: Subscription,
}

struct OpenTransaction {
    ctx: TransactionContext,
    /// An `execute_transaction` attempt whose body has not returned yet. It defers publication
    /// even after a watchdog rollback, since the body may still be writing.
    running: bool,
}

/// Marks an attempt as running for as long as it lives, so a cancelled body is released too
struct Running<'a, S: State> {
    store: &'a Store<S>,
    id: TransactionId,
}

impl<S: State> Drop for Running<'_, S> {
    fn drop(&mut self) {
        let mut open = self.store.0.open.lock().expect("open lock is poisoned");
        if let Some(entry) = open.iter_mut().find(|entry| entry.ctx.id() == self.id) {
            entry.running = false;
        }
    }
}

/// The rollback snapshot a store attaches to each of its transaction contexts
struct Snapshot<S> {
    store: Ulid,
    value: S,
}

impl<S: State> Store<S> {
    /// Creates a store holding `initial`, which is also kept as the target of `reset_state`
    pub fn new(initial: S, manager: &TransactionManager) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner<S>>| {
            let timeouts = {
                let weak = weak.clone();
                manager.subscribe_timeouts(move |timeout: TransactionTimeout| {
                    if let Some(inner) = weak.upgrade() {
                        Store(inner).restore_after_timeout(&timeout.context);
                    }
                })
            };
            Inner {
                id: Ulid::new(),
                state: RwLock::new(initial.clone()),
                broadcast: Broadcast::with_value(initial.clone()),
                initial,
                manager: manager.clone(),
                open: Mutex::new(Vec::new()),
                _timeouts: timeouts,
            }
        });
        Self(inner)
    }

    pub fn manager(&self) -> &TransactionManager { &self.0.manager }

    /// Returns a copy of the current state
    pub fn get_state(&self) -> S { self.0.state.read().expect("state lock is poisoned").clone() }

    /// Shallow-merges `partial` into the state and publishes the result, unless one of this
    /// store's transactions is open - in which case it is published when that transaction ends.
    pub fn set_state(&self, partial: S::Partial) {
        self.0.state.write().expect("state lock is poisoned").merge(partial);
        self.publish_if_settled();
    }

    /// Puts back a fresh copy of the initial state. Published like `set_state`.
    pub fn reset_state(&self) {
        *self.0.state.write().expect("state lock is poisoned") = self.0.initial.clone();
        self.publish_if_settled();
    }

    /// Registers an observer, which is immediately sent the last published state
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where O: IntoObserver<S, Fault> {
        self.0.broadcast.subscribe(observer)
    }

    pub fn begin_transaction(&self, options: TransactionOptions) -> TransactionContext {
        let ctx = self.0.manager.begin_transaction(options);
        self.track(&ctx, false);
        ctx
    }

    /// Opens a transaction with the manager's default options
    pub fn begin(&self) -> TransactionContext { self.begin_transaction(self.0.manager.default_options()) }

    pub fn commit_transaction(&self, ctx: &TransactionContext) -> Result<(), TransactionError> {
        self.0.manager.commit_transaction(ctx)?;
        self.publish_if_settled();
        Ok(())
    }

    /// Restores the state captured when `ctx` began, then rolls the transaction back
    pub fn rollback_transaction(&self, ctx: &TransactionContext) -> Result<(), TransactionError> {
        if ctx.is_pending() && self.0.manager.is_transaction_active(ctx.id()) {
            self.restore(ctx);
        }
        self.0.manager.rollback_transaction(ctx)?;
        self.publish_if_settled();
        Ok(())
    }

    /// Runs `body` in a transaction of this store.
    ///
    /// Each attempt snapshots the state when it begins. On success an `update` operation carrying
    /// the resulting state is logged and the transaction commits; on failure the snapshot is put
    /// back before the transaction rolls back. Retry behaves as in
    /// `TransactionManager::execute_transaction`.
    pub async fn execute_transaction<F, Fut, R, E>(&self, mut body: F, options: TransactionOptions) -> Result<R, E>
    where
        F: FnMut(TransactionContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError> + std::fmt::Display,
    {
        let result = self
            .0
            .manager
            .execute_transaction(
                |ctx: TransactionContext| {
                    self.track(&ctx, true);
                    let running = Running { store: self, id: ctx.id() };
                    let work = body(ctx.clone());
                    async move {
                        let _running = running;
                        match work.await {
                            Ok(result) if ctx.is_pending() => {
                                self.log_update(&ctx);
                                Ok(result)
                            }
                            Ok(result) => {
                                // timed out while the body was still running; the commit will fail
                                self.restore(&ctx);
                                Ok(result)
                            }
                            Err(err) => {
                                self.restore(&ctx);
                                Err(err)
                            }
                        }
                    }
                },
                options,
            )
            .await;
        self.publish_if_settled();
        result
    }

    pub fn transaction_logs(&self) -> Vec<TransactionLog> { self.0.manager.transaction_logs() }

    /// Completes the store's broadcast. Observers are sent `complete` and nothing after it.
    pub fn close(&self) { self.0.broadcast.complete(); }

    pub fn is_closed(&self) -> bool { self.0.broadcast.is_closed() }

    fn track(&self, ctx: &TransactionContext, running: bool) {
        ctx.attach(Snapshot { store: self.0.id, value: self.get_state() });
        self.0.open.lock().expect("open lock is poisoned").push(OpenTransaction { ctx: ctx.clone(), running });
    }

    fn snapshot_of(&self, ctx: &TransactionContext) -> Option<Arc<Snapshot<S>>> {
        ctx.attachment::<Snapshot<S>>().filter(|snapshot| snapshot.store == self.0.id)
    }

    /// Puts back the snapshot taken when `ctx` began. False if `ctx` is not one of ours.
    fn restore(&self, ctx: &TransactionContext) -> bool {
        let Some(snapshot) = self.snapshot_of(ctx) else { return false };
        *self.0.state.write().expect("state lock is poisoned") = snapshot.value.clone();
        debug!("Store: restored snapshot of {}", ctx.id());
        true
    }

    fn restore_after_timeout(&self, ctx: &TransactionContext) {
        if self.restore(ctx) {
            self.publish_if_settled();
        }
    }

    fn log_update(&self, ctx: &TransactionContext) {
        let operation = TransactionOperation::new(OperationKind::Update, STATE_TARGET);
        let operation = match serde_json::to_value(self.get_state()) {
            Ok(data) => operation.with_data(data),
            Err(e) => {
                warn!("Store: could not serialize state for the log of {}: {e}", ctx.id());
                operation
            }
        };
        self.0.manager.log_operation(ctx.id(), operation);
    }

    /// Publishes the current state if none of this store's transactions is still pending or running
    fn publish_if_settled(&self) {
        let settled = {
            let mut open = self.0.open.lock().expect("open lock is poisoned");
            open.retain(|entry| entry.running || entry.ctx.is_pending());
            open.is_empty()
        };
        if settled {
            self.0.broadcast.next(self.get_state());
        }
    }
}

impl<S: State + std::fmt::Debug> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.0.id)
            .field("state", &*self.0.state.read().expect("state lock is poisoned"))
            .field("observers", &self.0.broadcast.observer_count())
            .finish()
    }
}
