use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::{TransactionId, TransactionOptions};

/// `Pending` is the only non-terminal status. A context leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool { !matches!(self, TransactionStatus::Pending) }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// The identity, status and timing record of one atomic unit of work.
///
/// Cloning yields another handle to the same record. A context is created by
/// `TransactionManager::begin_transaction` and is never reused once it has terminated.
#[derive(Clone)]
pub struct TransactionContext(Arc<Inner>);

struct Inner {
    id: TransactionId,
    parent: Option<TransactionId>,
    options: TransactionOptions,
    start_time: DateTime<Utc>,
    lifecycle: Mutex<Lifecycle>,
    data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    timed_out: OnceLock<Duration>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

struct Lifecycle {
    status: TransactionStatus,
    end_time: Option<DateTime<Utc>>,
}

impl TransactionContext {
    pub(crate) fn new(options: TransactionOptions, parent: Option<TransactionId>) -> Self {
        Self(Arc::new(Inner {
            id: TransactionId::new(),
            parent,
            options,
            start_time: Utc::now(),
            lifecycle: Mutex::new(Lifecycle { status: TransactionStatus::Pending, end_time: None }),
            data: RwLock::new(None),
            timed_out: OnceLock::new(),
            watchdog: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> TransactionId { self.0.id }

    /// The transaction that was current when this one began, if any
    pub fn parent(&self) -> Option<TransactionId> { self.0.parent }

    pub fn options(&self) -> &TransactionOptions { &self.0.options }

    pub fn start_time(&self) -> DateTime<Utc> { self.0.start_time }

    /// Set when the context reaches a terminal status
    pub fn end_time(&self) -> Option<DateTime<Utc>> { self.0.lifecycle.lock().expect("lifecycle lock is poisoned").end_time }

    pub fn status(&self) -> TransactionStatus { self.0.lifecycle.lock().expect("lifecycle lock is poisoned").status }

    pub fn is_pending(&self) -> bool { self.status() == TransactionStatus::Pending }

    /// The timeout that elapsed, if this transaction was rolled back by the watchdog
    pub fn timed_out(&self) -> Option<Duration> {
        // recorded before the watchdog's rollback, which a commit may still win
        self.0.timed_out.get().copied().filter(|_| self.status() == TransactionStatus::RolledBack)
    }

    /// Attaches arbitrary data to the context, replacing anything attached before
    pub fn attach<D: Any + Send + Sync>(&self, data: D) { *self.0.data.write().expect("data lock is poisoned") = Some(Arc::new(data)); }

    /// Returns the attached data if it is of type `D`
    pub fn attachment<D: Any + Send + Sync>(&self) -> Option<Arc<D>> {
        let data = self.0.data.read().expect("data lock is poisoned").clone()?;
        data.downcast::<D>().ok()
    }

    /// Moves the context from `Pending` to `to`, or returns the status that prevented it
    pub(crate) fn transition(&self, to: TransactionStatus) -> Result<(), TransactionStatus> {
        let mut lifecycle = self.0.lifecycle.lock().expect("lifecycle lock is poisoned");
        if lifecycle.status.is_terminal() {
            return Err(lifecycle.status);
        }
        lifecycle.status = to;
        lifecycle.end_time = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn record_timeout(&self, timeout: Duration) { let _ = self.0.timed_out.set(timeout); }

    pub(crate) fn set_watchdog(&self, handle: JoinHandle<()>) {
        let mut watchdog = self.0.watchdog.lock().expect("watchdog lock is poisoned");
        if self.is_pending() {
            *watchdog = Some(handle);
        } else {
            // already finished before the timer could be retained
            handle.abort();
        }
    }

    /// Stops the watchdog timer, if one is running
    pub(crate) fn cancel_watchdog(&self) {
        if let Some(handle) = self.take_watchdog() {
            handle.abort();
        }
    }

    pub(crate) fn take_watchdog(&self) -> Option<JoinHandle<()>> { self.0.watchdog.lock().expect("watchdog lock is poisoned").take() }
}

impl PartialEq for TransactionContext {
    fn eq(&self, other: &Self) -> bool { self.0.id == other.0.id }
}
impl Eq for TransactionContext {}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.0.lifecycle.lock().expect("lifecycle lock is poisoned");
        f.debug_struct("TransactionContext")
            .field("id", &self.0.id)
            .field("parent", &self.0.parent)
            .field("status", &lifecycle.status)
            .field("start_time", &self.0.start_time)
            .field("end_time", &lifecycle.end_time)
            .finish()
    }
}

impl std::fmt::Display for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{} ({})", self.0.id, self.status()) }
}
