//! Error types for transaction and store operations.

use std::time::Duration;

use thiserror::Error;

use crate::transaction::{TransactionId, TransactionStatus};

/// Misuse of the transaction lifecycle, or a transaction that outlived its timeout.
///
/// Returned from: `TransactionManager::commit_transaction`, `rollback_transaction`;
/// the matching `Store` methods; and, converted into the caller's error type,
/// from `execute_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The id is not in the active set of this manager
    #[error("transaction {0} not found")]
    NotFound(TransactionId),

    /// The context already reached a terminal status
    #[error("transaction {0} is already {1}")]
    InvalidState(TransactionId, TransactionStatus),

    /// The watchdog rolled the transaction back before it was finished
    #[error("transaction {id} timed out after {timeout:?}")]
    Timeout { id: TransactionId, timeout: Duration },

    /// `TransactionalMethods::call` was given a name that was never registered
    #[error("no transactional method named {0:?}")]
    UnknownMethod(String),
}
