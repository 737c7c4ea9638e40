use super::Observer;
use crate::Fault;

pub type NextCallback<T> = Box<dyn Fn(T) + Send + Sync + 'static>;
pub type ErrorCallback<E> = Box<dyn Fn(E) + Send + Sync + 'static>;
pub type CompleteCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// A CallbackObserver is an observer assembled from up to three separate callbacks.
///
/// ```rust
/// use txstore_signals::*;
///
/// let broadcast: Broadcast<u32, String> = Broadcast::new();
/// let _sub = broadcast.subscribe(
///     CallbackObserver::new(|v: u32| println!("next: {v}"))
///         .on_error(|e: String| println!("error: {e}"))
///         .on_complete(|| println!("done")),
/// );
/// broadcast.next(1);
/// broadcast.complete();
/// ```
pub struct CallbackObserver<T, E = Fault> {
    on_next: NextCallback<T>,
    on_error: Option<ErrorCallback<E>>,
    on_complete: Option<CompleteCallback>,
}

impl<T, E> CallbackObserver<T, E> {
    /// Create an observer that only handles values
    pub fn new<F>(on_next: F) -> Self
    where F: Fn(T) + Send + Sync + 'static {
        Self { on_next: Box::new(on_next), on_error: None, on_complete: None }
    }

    /// Create an observer from three separate callbacks. The terminal handlers are optional.
    pub fn from_callbacks(on_next: NextCallback<T>, on_error: Option<ErrorCallback<E>>, on_complete: Option<CompleteCallback>) -> Self {
        Self { on_next, on_error, on_complete }
    }

    pub fn on_error<F>(mut self, on_error: F) -> Self
    where F: Fn(E) + Send + Sync + 'static {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn on_complete<F>(mut self, on_complete: F) -> Self
    where F: Fn() + Send + Sync + 'static {
        self.on_complete = Some(Box::new(on_complete));
        self
    }
}

impl<T, E> Observer<T, E> for CallbackObserver<T, E> {
    fn next(&self, value: T) { (self.on_next)(value) }

    fn error(&self, error: E) {
        if let Some(on_error) = &self.on_error {
            on_error(error)
        }
    }

    fn complete(&self) {
        if let Some(on_complete) = &self.on_complete {
            on_complete()
        }
    }
}

impl<T, E> std::fmt::Debug for CallbackObserver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackObserver")
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
