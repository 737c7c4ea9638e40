use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tracing::{debug, warn};
use txstore_signals::{Broadcast, IntoObserver, Subscription};

use super::log::LogBook;
use super::{TransactionContext, TransactionId, TransactionLog, TransactionOperation, TransactionOptions, TransactionStatus};
use crate::error::TransactionError;

/// Published by the watchdog when it rolls back a transaction that outlived its timeout
#[derive(Debug, Clone)]
pub struct TransactionTimeout {
    pub context: TransactionContext,
    pub timeout: Duration,
}

impl From<&TransactionTimeout> for TransactionError {
    fn from(timeout: &TransactionTimeout) -> Self { TransactionError::Timeout { id: timeout.context.id(), timeout: timeout.timeout } }
}

/// Coordinates the lifecycle of transactions: identity, status, nesting, timeout and retry.
///
/// Cloning yields another handle to the same manager. Components that need transactions take a
/// manager at construction time; there is no process-wide instance.
#[derive(Clone)]
pub struct TransactionManager(Arc<Inner>);

struct Inner {
    defaults: TransactionOptions,
    active: RwLock<HashMap<TransactionId, TransactionContext>>,
    nesting: Mutex<Nesting>,
    logs: RwLock<LogBook>,
    timeouts: Broadcast<TransactionTimeout>,
}

/// The current transaction, and the enclosing ones it displaced
#[derive(Default)]
struct Nesting {
    current: Option<TransactionContext>,
    outer: Vec<TransactionContext>,
}

impl Nesting {
    fn enter(&mut self, ctx: TransactionContext) {
        if let Some(previous) = self.current.replace(ctx) {
            self.outer.push(previous);
        }
    }

    fn leave(&mut self, id: TransactionId) {
        if self.current.as_ref().map(|c| c.id()) == Some(id) {
            // restore the nearest enclosing transaction that is still open
            self.current = None;
            while let Some(outer) = self.outer.pop() {
                if outer.is_pending() {
                    self.current = Some(outer);
                    break;
                }
            }
        } else {
            self.outer.retain(|c| c.id() != id);
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self { Self::new() }
}

impl TransactionManager {
    pub fn new() -> Self { Self::with_defaults(TransactionOptions::default()) }

    /// A manager whose `default_options` are `defaults` rather than the built-in ones
    pub fn with_defaults(defaults: TransactionOptions) -> Self {
        Self(Arc::new(Inner {
            defaults,
            active: RwLock::new(HashMap::new()),
            nesting: Mutex::new(Nesting::default()),
            logs: RwLock::new(LogBook::default()),
            timeouts: Broadcast::transient(),
        }))
    }

    pub fn default_options(&self) -> TransactionOptions { self.0.defaults.clone() }

    /// Opens a transaction.
    ///
    /// If another transaction is current it becomes this one's parent and is restored as current
    /// once this one commits or rolls back. A timeout watchdog is scheduled on the ambient tokio
    /// runtime; outside a runtime the transaction simply has no watchdog.
    pub fn begin_transaction(&self, options: TransactionOptions) -> TransactionContext {
        let ctx = {
            let mut nesting = self.0.nesting.lock().expect("nesting lock is poisoned");
            let parent = nesting.current.as_ref().map(|c| c.id());
            let ctx = TransactionContext::new(options, parent);
            nesting.enter(ctx.clone());
            ctx
        };
        self.0.active.write().expect("active lock is poisoned").insert(ctx.id(), ctx.clone());
        debug!("TransactionManager: began {} (parent: {:?})", ctx.id(), ctx.parent());

        self.schedule_watchdog(&ctx);
        ctx
    }

    /// Opens a transaction with this manager's default options
    pub fn begin(&self) -> TransactionContext { self.begin_transaction(self.default_options()) }

    pub fn commit_transaction(&self, ctx: &TransactionContext) -> Result<(), TransactionError> {
        self.finish(ctx, TransactionStatus::Committed)?;
        debug!("TransactionManager: committed {}", ctx.id());
        Ok(())
    }

    pub fn rollback_transaction(&self, ctx: &TransactionContext) -> Result<(), TransactionError> {
        self.finish(ctx, TransactionStatus::RolledBack)?;
        debug!("TransactionManager: rolled back {}", ctx.id());
        Ok(())
    }

    /// Runs `body` inside a transaction, committing on `Ok` and rolling back on `Err`.
    ///
    /// With `auto_retry` set, a failed attempt is followed by up to `max_retries` further
    /// attempts, each a fresh transaction, with `retry_delay` between them. The error of the last
    /// attempt is returned once they are exhausted. Without it, the body's error is returned
    /// unchanged.
    ///
    /// The delay between retries is a `tokio::time::sleep`, so retrying requires a tokio runtime
    /// with the time driver enabled. A single attempt runs under any executor.
    pub async fn execute_transaction<F, Fut, R, E>(&self, mut body: F, options: TransactionOptions) -> Result<R, E>
    where
        F: FnMut(TransactionContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError> + std::fmt::Display,
    {
        let retries = options.retry_budget();
        let mut attempt = 0;
        loop {
            match self.attempt(&mut body, &options).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < retries => {
                    attempt += 1;
                    warn!("TransactionManager: attempt {attempt} of {} failed: {err}; retrying in {:?}", retries + 1, options.retry_delay);
                    drop(err);
                    tokio::time::sleep(options.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt<F, Fut, R, E>(&self, body: &mut F, options: &TransactionOptions) -> Result<R, E>
    where
        F: FnMut(TransactionContext) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<TransactionError>,
    {
        let ctx = self.begin_transaction(options.clone());
        match body(ctx.clone()).await {
            Ok(result) => {
                self.commit_transaction(&ctx)?;
                Ok(result)
            }
            Err(err) => {
                // already rolled back by the watchdog, most likely
                if let Err(rollback_err) = self.rollback_transaction(&ctx) {
                    debug!("TransactionManager: rollback after failure of {} skipped: {rollback_err}", ctx.id());
                }
                Err(err)
            }
        }
    }

    /// Appends `operation` to the log of `transaction_id`, creating the log if needed
    pub fn log_operation(&self, transaction_id: TransactionId, operation: TransactionOperation) {
        self.0.logs.write().expect("logs lock is poisoned").append(transaction_id, operation);
    }

    pub fn active_transactions(&self) -> Vec<TransactionContext> {
        self.0.active.read().expect("active lock is poisoned").values().cloned().collect()
    }

    pub fn is_transaction_active(&self, id: TransactionId) -> bool { self.0.active.read().expect("active lock is poisoned").contains_key(&id) }

    /// The innermost open transaction begun on this manager
    pub fn current_transaction(&self) -> Option<TransactionContext> { self.0.nesting.lock().expect("nesting lock is poisoned").current.clone() }

    pub fn transaction_logs(&self) -> Vec<TransactionLog> { self.0.logs.read().expect("logs lock is poisoned").all().to_vec() }

    pub fn transaction_log(&self, id: TransactionId) -> Option<TransactionLog> { self.0.logs.read().expect("logs lock is poisoned").get(id).cloned() }

    pub fn clear_transaction_logs(&self) { self.0.logs.write().expect("logs lock is poisoned").clear(); }

    /// Observe transactions rolled back by the watchdog.
    ///
    /// Only timeouts that happen after subscribing are delivered; earlier ones are not replayed.
    pub fn subscribe_timeouts<O>(&self, observer: O) -> Subscription
    where O: IntoObserver<TransactionTimeout, txstore_signals::Fault> {
        self.0.timeouts.subscribe(observer)
    }

    fn finish(&self, ctx: &TransactionContext, to: TransactionStatus) -> Result<(), TransactionError> {
        self.claim(ctx, to)?;
        self.retire(ctx);
        Ok(())
    }

    /// Performs the status transition, provided `ctx` is open on this manager
    fn claim(&self, ctx: &TransactionContext, to: TransactionStatus) -> Result<(), TransactionError> {
        let registered = self.0.active.read().expect("active lock is poisoned").get(&ctx.id()).cloned();
        let Some(registered) = registered else { return Err(refusal(ctx, ctx.status())) };
        registered.transition(to).map_err(|status| refusal(ctx, status))
    }

    /// Bookkeeping after a transition: drop from the active set and restore the enclosing transaction
    fn retire(&self, ctx: &TransactionContext) {
        ctx.cancel_watchdog();
        self.0.active.write().expect("active lock is poisoned").remove(&ctx.id());
        self.0.nesting.lock().expect("nesting lock is poisoned").leave(ctx.id());
    }

    fn schedule_watchdog(&self, ctx: &TransactionContext) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("TransactionManager: no tokio runtime, {} has no timeout watchdog", ctx.id());
            return;
        };
        let manager = Arc::downgrade(&self.0);
        let watched = ctx.clone();
        let timeout = ctx.options().timeout;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            expire(manager, watched, timeout);
        });
        ctx.set_watchdog(handle);
    }
}

/// Why `ctx` cannot be finished, given the status it was found in
fn refusal(ctx: &TransactionContext, status: TransactionStatus) -> TransactionError {
    match ctx.timed_out() {
        Some(timeout) => TransactionError::Timeout { id: ctx.id(), timeout },
        None if status.is_terminal() => TransactionError::InvalidState(ctx.id(), status),
        None => TransactionError::NotFound(ctx.id()),
    }
}

/// Watchdog expiry. Runs detached from whoever opened the transaction, so it reports rather than fails.
fn expire(manager: Weak<Inner>, ctx: TransactionContext, timeout: Duration) {
    let Some(inner) = manager.upgrade() else { return };
    let manager = TransactionManager(inner);
    // we are the watchdog; nothing left to cancel
    drop(ctx.take_watchdog());

    if !manager.is_transaction_active(ctx.id()) {
        return;
    }
    // recorded first so that a caller finishing concurrently is told about the timeout
    ctx.record_timeout(timeout);
    if manager.claim(&ctx, TransactionStatus::RolledBack).is_err() {
        // lost the race with the caller
        return;
    }
    manager.retire(&ctx);
    warn!("TransactionManager: {} timed out after {timeout:?} and was rolled back", ctx.id());
    manager.0.timeouts.next(TransactionTimeout { context: ctx, timeout });
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager").field("active", &self.0.active.read().expect("active lock is poisoned").len()).finish()
    }
}
