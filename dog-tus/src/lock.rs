use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::{ResourceId, TusResult};

/// Exclusive, non-reentrant lock on one resource.
///
/// A handle starts unheld. `lock` never waits: it either takes the lock or
/// reports that someone else holds it.
#[async_trait]
pub trait FileLock: Send {
    /// Try to take the lock. `Ok(false)` means another request holds it.
    async fn lock(&mut self) -> TusResult<bool>;

    /// Release the lock if this handle holds it. Safe to call repeatedly.
    fn release_if_held(&mut self);
}

/// Hands out lock handles for resource ids
#[async_trait]
pub trait FileLockProvider: Send + Sync {
    async fn lock_for(&self, id: &ResourceId) -> TusResult<Box<dyn FileLock>>;
}

/// Process-local lock table shared by every handle it creates
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileLockProvider {
    held: Arc<Mutex<HashSet<ResourceId>>>,
}

impl InMemoryFileLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any handle currently holds the lock for `id`
    pub fn is_locked(&self, id: &ResourceId) -> bool {
        self.held.lock().contains(id)
    }
}

#[async_trait]
impl FileLockProvider for InMemoryFileLockProvider {
    async fn lock_for(&self, id: &ResourceId) -> TusResult<Box<dyn FileLock>> {
        Ok(Box::new(InMemoryFileLock {
            table: Arc::clone(&self.held),
            id: id.clone(),
            held: false,
        }))
    }
}

/// Handle produced by [`InMemoryFileLockProvider`]. Dropping it releases the lock.
#[derive(Debug)]
pub struct InMemoryFileLock {
    table: Arc<Mutex<HashSet<ResourceId>>>,
    id: ResourceId,
    held: bool,
}

#[async_trait]
impl FileLock for InMemoryFileLock {
    async fn lock(&mut self) -> TusResult<bool> {
        if self.held {
            // non-reentrant
            return Ok(false);
        }

        self.held = self.table.lock().insert(self.id.clone());
        if !self.held {
            debug!(file_id = %self.id, "lock already held");
        }
        Ok(self.held)
    }

    fn release_if_held(&mut self) {
        if !self.held {
            return;
        }
        self.table.lock().remove(&self.id);
        self.held = false;
    }
}

impl Drop for InMemoryFileLock {
    fn drop(&mut self) {
        self.release_if_held();
    }
}
