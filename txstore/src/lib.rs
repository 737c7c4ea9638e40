//! # txstore
//!
//! Transactional, observable state for async Rust.
//!
//! ## Core Concepts
//!
//! - **TransactionManager**: Hands out transactions, tracks which are open and nested, enforces
//!   timeouts, retries failed work and keeps a log of what each transaction did
//! - **Store**: A state container whose mutations can be grouped into transactions, with rollback
//!   to the state at the start of the transaction
//! - **Broadcast**: Multicast notification with last-value replay. Store observers are built on it
//! - **Merge**: How a partial update is folded into a store's state
//!
//! ## Example
//!
//! ```rust
//! # use txstore::{Store, TransactionManager, TransactionOptions};
//! # use serde_json::json;
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//!     let manager = TransactionManager::new();
//!     let store = Store::new(json!({"count": 0}), &manager);
//!
//!     // observers only ever see committed state
//!     let _subscription = store.subscribe(|state: serde_json::Value| println!("count is now {}", state["count"]));
//!
//!     let ctx = store.begin();
//!     store.set_state(json!({"count": 99}));
//!     store.rollback_transaction(&ctx)?;
//!     assert_eq!(store.get_state(), json!({"count": 0}));
//!
//!     store
//!         .execute_transaction(
//!             |_| {
//!                 store.set_state(json!({"count": 1}));
//!                 async { Ok::<_, anyhow::Error>(()) }
//!             },
//!             TransactionOptions::default(),
//!         )
//!         .await?;
//!     assert_eq!(store.get_state(), json!({"count": 1}));
//!
//!     Ok(())
//! # }
//! ```
//!
//! Components take their `TransactionManager` at construction. Share one manager between stores
//! to give them a common active set, nesting stack and log.

pub use txstore_core as core;
pub use txstore_signals as signals;

// Re-export commonly used types
pub use txstore_core::{
    error, merge, store, transaction, wrap, wrap_transactional, IsolationLevel, Merge, OperationKind, Store, TransactionContext,
    TransactionError, TransactionId, TransactionLog, TransactionManager, TransactionOperation, TransactionOptions, TransactionStatus,
    TransactionTimeout, TransactionalMethods,
};
pub use txstore_signals::{Broadcast, CallbackObserver, Fault, IntoObserver, Notification, Observer, Subscription};
