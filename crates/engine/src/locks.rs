//! Per-group write locks.
//!
//! A mutation reads a group's whole fact set and rewrites its whole balance
//! cache, so two interleaved writers could persist a stale recompute over a
//! newer one. One async mutex per group id serializes the writers while
//! leaving other groups untouched; balance reads never take a lock.
//!
//! Acquisition is timeout-bounded: a writer that cannot get the lock in time
//! fails with [`EngineError::Retryable`] before anything was read or
//! written, so the caller can simply retry the whole operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{EngineError, ResultEngine};

#[derive(Debug, Default)]
pub(crate) struct GroupLocks {
    handles: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl GroupLocks {
    fn handle(&self, group_id: &str) -> Arc<AsyncMutex<()>> {
        let mut handles = match self.handles.lock() {
            Ok(guard) => guard,
            // A poisoned registry still holds valid handles.
            Err(poisoned) => poisoned.into_inner(),
        };
        handles.entry(group_id.to_string()).or_default().clone()
    }

    /// Take the exclusive lock for `group_id`, waiting at most `timeout`.
    pub(crate) async fn acquire(
        &self,
        group_id: &str,
        timeout: Duration,
    ) -> ResultEngine<OwnedMutexGuard<()>> {
        let handle = self.handle(group_id);
        match tokio::time::timeout(timeout, handle.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(group_id, ?timeout, "group lock acquisition timed out");
                Err(EngineError::Retryable(format!(
                    "group {group_id} is locked by another operation"
                )))
            }
        }
    }
}
