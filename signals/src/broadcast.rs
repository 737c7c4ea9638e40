use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error};

use crate::{Fault, IntoObserver, Observer, Subscription};

/// Identifies one registration on a broadcast. Ids are handed out in increasing order,
/// which is also the delivery order.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObserverId(usize);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// A multicast sender with last-value replay and one-shot termination.
///
/// Cloning a `Broadcast` yields another handle to the same channel.
pub struct Broadcast<T, E = Fault>(Arc<Inner<T, E>>);

impl<T, E> Clone for Broadcast<T, E> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

struct Inner<T, E> {
    state: RwLock<State<T, E>>,
    next_id: AtomicUsize,
    /// Whether the latest value is retained for late subscribers
    replay: bool,
}

struct State<T, E> {
    observers: BTreeMap<ObserverId, Arc<dyn Observer<T, E>>>,
    value: Option<T>,
    terminal: Option<Terminal<E>>,
}

#[derive(Clone)]
enum Terminal<E> {
    Error(E),
    Complete,
}

/// What a fresh subscriber is owed at the moment it registers
enum Replay<T, E> {
    Value(Option<T>),
    Terminal(Terminal<E>),
}

/// The detach side of a broadcast, erased so that `Subscription` need not carry `T` and `E`
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, id: ObserverId) -> bool;
    fn contains(&self, id: ObserverId) -> bool;
}

impl<T, E> Detach for Inner<T, E>
where
    T: Send + Sync,
    E: Send + Sync,
{
    fn detach(&self, id: ObserverId) -> bool { self.state.write().expect("broadcast lock is poisoned").observers.remove(&id).is_some() }

    fn contains(&self, id: ObserverId) -> bool { self.state.read().expect("broadcast lock is poisoned").observers.contains_key(&id) }
}

impl<T, E> std::fmt::Debug for Broadcast<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.read().expect("broadcast lock is poisoned");
        f.debug_struct("Broadcast")
            .field("observers", &state.observers.len())
            .field("has_value", &state.value.is_some())
            .field("closed", &state.terminal.is_some())
            .finish()
    }
}

impl<T, E> Default for Broadcast<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self { Self::new() }
}

impl<T, E> Broadcast<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a broadcast holding no value
    pub fn new() -> Self { Self::build(true) }

    /// Creates a broadcast that keeps no value, for events rather than state. Observers only
    /// receive what is sent after they subscribe; termination is still replayed.
    pub fn transient() -> Self { Self::build(false) }

    fn build(replay: bool) -> Self {
        Self(Arc::new(Inner {
            state: RwLock::new(State { observers: BTreeMap::new(), value: None, terminal: None }),
            next_id: AtomicUsize::new(0),
            replay,
        }))
    }

    /// Creates a broadcast that already holds `value`, so the first subscriber is replayed it
    pub fn with_value(value: T) -> Self {
        let broadcast = Self::new();
        broadcast.0.state.write().expect("broadcast lock is poisoned").value = Some(value);
        broadcast
    }

    /// Registers an observer.
    ///
    /// The observer is synchronously sent the current value (if any) before this returns. If the
    /// broadcast has already terminated, the observer synchronously receives the terminal
    /// notification instead and the returned subscription is already closed.
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where O: IntoObserver<T, E> {
        let observer = observer.into_observer();
        let id = ObserverId(self.0.next_id.fetch_add(1, Ordering::Relaxed));

        let replay = {
            let mut state = self.0.state.write().expect("broadcast lock is poisoned");
            match &state.terminal {
                Some(terminal) => Replay::Terminal(terminal.clone()),
                None => {
                    state.observers.insert(id, observer.clone());
                    Replay::Value(state.value.clone())
                }
            }
        };

        // Deliver the replay without holding the lock - the observer may well call back into us
        match replay {
            Replay::Value(value) => {
                debug!("Broadcast: observer {id} subscribed");
                if let Some(value) = value {
                    deliver(id, "next", || observer.next(value));
                }
                let source: Weak<dyn Detach> = Arc::downgrade(&self.0) as Weak<dyn Detach>;
                Subscription::new(id, source)
            }
            Replay::Terminal(Terminal::Error(err)) => {
                deliver(id, "error", || observer.error(err));
                Subscription::terminated(id)
            }
            Replay::Terminal(Terminal::Complete) => {
                deliver(id, "complete", || observer.complete());
                Subscription::terminated(id)
            }
        }
    }

    /// Records `value` as the latest value and sends it to every registered observer.
    /// No-op once the broadcast has terminated.
    pub fn next(&self, value: T) {
        let observers = {
            let mut state = self.0.state.write().expect("broadcast lock is poisoned");
            if state.terminal.is_some() {
                return;
            }
            if self.0.replay {
                state.value = Some(value.clone());
            }
            state.observers.iter().map(|(id, observer)| (*id, observer.clone())).collect::<Vec<_>>()
        };

        // clone the value for each observer except the last one
        if let Some(((last_id, last), rest)) = observers.split_last() {
            for (id, observer) in rest {
                let value = value.clone();
                deliver(*id, "next", || observer.next(value));
            }
            deliver(*last_id, "next", || last.next(value));
        }
    }

    /// Terminates the broadcast with an error
    pub fn error(&self, err: E) {
        let Some(observers) = self.terminate(Terminal::Error(err.clone())) else { return };
        for (id, observer) in observers {
            let err = err.clone();
            deliver(id, "error", || observer.error(err));
        }
    }

    /// Terminates the broadcast successfully
    pub fn complete(&self) {
        let Some(observers) = self.terminate(Terminal::Complete) else { return };
        for (id, observer) in observers {
            deliver(id, "complete", || observer.complete());
        }
    }

    /// Marks the broadcast terminated and takes the observer list, or returns None if it already was
    fn terminate(&self, terminal: Terminal<E>) -> Option<BTreeMap<ObserverId, Arc<dyn Observer<T, E>>>> {
        let mut state = self.0.state.write().expect("broadcast lock is poisoned");
        if state.terminal.is_some() {
            return None;
        }
        state.terminal = Some(terminal);
        let observers = std::mem::take(&mut state.observers);
        debug!("Broadcast: terminated with {} observers", observers.len());
        Some(observers)
    }

    /// Returns a clone of the latest value, if any
    pub fn value(&self) -> Option<T> { self.0.state.read().expect("broadcast lock is poisoned").value.clone() }
}

impl<T, E> Broadcast<T, E> {
    pub fn has_value(&self) -> bool { self.0.state.read().expect("broadcast lock is poisoned").value.is_some() }

    /// True once `error` or `complete` has been called
    pub fn is_closed(&self) -> bool { self.0.state.read().expect("broadcast lock is poisoned").terminal.is_some() }

    pub fn observer_count(&self) -> usize { self.0.state.read().expect("broadcast lock is poisoned").observers.len() }
}

/// Calls into an observer, containing any panic so that it neither reaches the producer
/// nor prevents delivery to the remaining observers.
fn deliver(id: ObserverId, kind: &'static str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        error!("Broadcast: observer {id} panicked during {kind}: {message}");
    }
}
