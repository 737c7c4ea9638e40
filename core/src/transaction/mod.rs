//! Transaction lifecycle management.
//!
//! A [`TransactionManager`] owns the identity, status, nesting, timeout and retry policy of
//! atomic units of work. It knows nothing about the data being protected; components like
//! [`crate::store::Store`] attach whatever they need to the [`TransactionContext`].

mod context;
mod id;
mod log;
mod manager;
mod options;

pub use context::{TransactionContext, TransactionStatus};
pub use id::TransactionId;
pub use log::{OperationKind, TransactionLog, TransactionOperation};
pub use manager::{TransactionManager, TransactionTimeout};
pub use options::{IsolationLevel, TransactionOptions};
