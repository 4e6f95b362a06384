//! In-memory registry of tracked operations.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use crate::{
    errors::{OperationError, OperationResult},
    model::{Operation, OperationId},
};

/// Shared, lockable handle to a single operation record.
pub type OperationEntry = Arc<Mutex<Operation>>;

/// Registry of every operation the gateway created.
///
/// The map lock is only held to look entries up or add them; each record has its own lock so
/// that a slow backend call for one operation does not block the others.
#[derive(Debug, Clone, Default)]
pub struct OperationStore {
    entries: Arc<RwLock<HashMap<OperationId, OperationEntry>>>,
}

impl OperationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `operation`.
    pub async fn insert(&self, operation: Operation) -> OperationResult<OperationEntry> {
        let mut entries = self.entries.write().await;
        let id = operation.id().clone();
        if entries.contains_key(&id) {
            return Err(OperationError::DuplicateId(id));
        }

        let entry = Arc::new(Mutex::new(operation));
        entries.insert(id, entry.clone());

        Ok(entry)
    }

    /// Looks up the record for `id`.
    pub async fn entry(&self, id: &OperationId) -> Option<OperationEntry> {
        self.entries.read().await.get(id).cloned()
    }

    /// Number of tracked operations.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
