use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
}

/// One logical operation performed inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOperation {
    pub kind: OperationKind,
    pub target: String,
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionOperation {
    pub fn new(kind: OperationKind, target: impl Into<String>) -> Self { Self { kind, target: target.into(), data: None, timestamp: Utc::now() } }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The ordered record of operations performed by one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLog {
    pub transaction_id: TransactionId,
    pub operations: Vec<TransactionOperation>,
}

/// Append-only logs, kept in the order their transactions first logged something
#[derive(Default)]
pub(crate) struct LogBook {
    logs: Vec<TransactionLog>,
    index: HashMap<TransactionId, usize>,
}

impl LogBook {
    pub fn append(&mut self, transaction_id: TransactionId, operation: TransactionOperation) {
        let position = *self.index.entry(transaction_id).or_insert_with(|| {
            self.logs.push(TransactionLog { transaction_id, operations: Vec::new() });
            self.logs.len() - 1
        });
        self.logs[position].operations.push(operation);
    }

    pub fn get(&self, transaction_id: TransactionId) -> Option<&TransactionLog> { self.index.get(&transaction_id).map(|&i| &self.logs[i]) }

    pub fn all(&self) -> &[TransactionLog] { &self.logs }

    pub fn clear(&mut self) {
        self.logs.clear();
        self.index.clear();
    }
}
