use std::sync::Arc;

use crate::Fault;

mod callback_observer;
pub use callback_observer::*;

/// The consumer side of a broadcast.
///
/// `error` and `complete` are terminal: at most one of them is delivered, at most once,
/// and nothing follows it. Implementations that only care about values can rely on the
/// default no-op terminal handlers.
pub trait Observer<T, E = Fault>: Send + Sync {
    fn next(&self, value: T);

    fn error(&self, _error: E) {}

    fn complete(&self) {}
}

/// A notification as a plain value, for observers that forward into a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification<T, E = Fault> {
    Next(T),
    Error(E),
    Complete,
}

/// Trait for types that can be registered as an observer of a `Broadcast<T, E>`
pub trait IntoObserver<T, E> {
    fn into_observer(self) -> Arc<dyn Observer<T, E>>;
}

/// A bare closure observes values only
struct NextFn<F>(F);

impl<F, T, E> Observer<T, E> for NextFn<F>
where F: Fn(T) + Send + Sync
{
    fn next(&self, value: T) { (self.0)(value) }
}

impl<F, T, E> IntoObserver<T, E> for F
where
    F: Fn(T) + Send + Sync + 'static,
    T: 'static,
    E: 'static,
{
    fn into_observer(self) -> Arc<dyn Observer<T, E>> { Arc::new(NextFn(self)) }
}

impl<T, E> IntoObserver<T, E> for Arc<dyn Observer<T, E>> {
    fn into_observer(self) -> Arc<dyn Observer<T, E>> { self }
}

impl<T, E> IntoObserver<T, E> for CallbackObserver<T, E>
where
    T: 'static,
    E: 'static,
{
    fn into_observer(self) -> Arc<dyn Observer<T, E>> { Arc::new(self) }
}

impl<T: Send, E: Send> Observer<T, E> for std::sync::mpsc::Sender<Notification<T, E>> {
    fn next(&self, value: T) {
        let _ = self.send(Notification::Next(value)); // Ignore send errors
    }
    fn error(&self, error: E) { let _ = self.send(Notification::Error(error)); }
    fn complete(&self) { let _ = self.send(Notification::Complete); }
}

impl<T, E> IntoObserver<T, E> for std::sync::mpsc::Sender<Notification<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn into_observer(self) -> Arc<dyn Observer<T, E>> { Arc::new(self) }
}

#[cfg(feature = "tokio")]
impl<T: Send, E: Send> Observer<T, E> for tokio::sync::mpsc::UnboundedSender<Notification<T, E>> {
    fn next(&self, value: T) {
        let _ = self.send(Notification::Next(value)); // Ignore send errors
    }
    fn error(&self, error: E) { let _ = self.send(Notification::Error(error)); }
    fn complete(&self) { let _ = self.send(Notification::Complete); }
}

#[cfg(feature = "tokio")]
impl<T, E> IntoObserver<T, E> for tokio::sync::mpsc::UnboundedSender<Notification<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn into_observer(self) -> Arc<dyn Observer<T, E>> { Arc::new(self) }
}
