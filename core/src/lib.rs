pub mod error;
pub mod merge;
pub mod store;
pub mod transaction;
pub mod wrap;

pub use error::TransactionError;
pub use merge::Merge;
pub use store::{State, Store, STATE_TARGET};
pub use transaction::{
    IsolationLevel, OperationKind, TransactionContext, TransactionId, TransactionLog, TransactionManager, TransactionOperation,
    TransactionOptions, TransactionStatus, TransactionTimeout,
};
pub use wrap::{wrap_transactional, TransactionalMethods};

pub use txstore_signals as signals;
