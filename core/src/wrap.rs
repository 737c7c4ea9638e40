//! Running ordinary async functions inside managed transactions.
//!
//! There is no reflection here. A function is wrapped explicitly with [`wrap_transactional`], or
//! registered by name on a [`TransactionalMethods`] table, and every call then goes through
//! `TransactionManager::execute_transaction`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::error::TransactionError;
use crate::transaction::{TransactionManager, TransactionOptions};

type Method<A, R, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;

/// Wraps `f` so that each call runs in its own transaction on `manager`.
///
/// The argument is forwarded to `f` (cloned once per attempt when `options` enables retry) and
/// the result comes back unchanged. A failed call rolls its transaction back. Retrying needs a
/// tokio runtime, as for `TransactionManager::execute_transaction`.
///
/// ```rust
/// # use txstore_core::{wrap_transactional, TransactionError, TransactionManager, TransactionOptions};
/// # futures::executor::block_on(async {
/// let manager = TransactionManager::new();
/// let double = wrap_transactional(&manager, TransactionOptions::default(), |x: i32| async move { Ok::<_, TransactionError>(x * 2) });
/// assert_eq!(double(21).await, Ok(42));
/// # });
/// ```
pub fn wrap_transactional<A, R, E, F, Fut>(
    manager: &TransactionManager,
    options: TransactionOptions,
    f: F,
) -> impl Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync + 'static
where
    A: Clone + Send + 'static,
    R: Send + 'static,
    E: From<TransactionError> + Display + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let manager = manager.clone();
    let f = Arc::new(f);
    move |arg: A| {
        let manager = manager.clone();
        let options = options.clone();
        let f = f.clone();
        async move { manager.execute_transaction(move |_| f(arg.clone()), options).await }.boxed()
    }
}

/// A table of named async functions, each of which runs in its own transaction when called.
///
/// All methods of one table share an argument, result and error type.
pub struct TransactionalMethods<A, R, E> {
    manager: TransactionManager,
    options: TransactionOptions,
    methods: BTreeMap<String, Method<A, R, E>>,
}

impl<A, R, E> TransactionalMethods<A, R, E>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
    E: From<TransactionError> + Display + Send + 'static,
{
    /// `options` applies to every method registered with [`method`](Self::method)
    pub fn new(manager: &TransactionManager, options: TransactionOptions) -> Self {
        Self { manager: manager.clone(), options, methods: BTreeMap::new() }
    }

    /// Registers `f` under `name`, replacing any earlier method of that name
    pub fn method<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let options = self.options.clone();
        self.method_with_options(name, options, f)
    }

    /// Registers `f` under `name` with its own transaction options
    pub fn method_with_options<F, Fut>(mut self, name: impl Into<String>, options: TransactionOptions, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let name = name.into();
        debug!("TransactionalMethods: registered {name}");
        self.methods.insert(name, Arc::new(wrap_transactional(&self.manager, options, f)));
        self
    }

    pub fn contains(&self, name: &str) -> bool { self.methods.contains_key(name) }

    /// Registered names, in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ { self.methods.keys().map(String::as_str) }

    /// Calls the method registered under `name`. Unknown names fail with `TransactionError::UnknownMethod`.
    pub async fn call(&self, name: &str, arg: A) -> Result<R, E> {
        let method = self.methods.get(name).cloned().ok_or_else(|| TransactionError::UnknownMethod(name.to_owned()))?;
        method(arg).await
    }
}

impl<A, R, E> std::fmt::Debug for TransactionalMethods<A, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalMethods").field("methods", &self.methods.keys().collect::<Vec<_>>()).finish()
    }
}
