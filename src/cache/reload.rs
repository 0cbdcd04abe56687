//! Refresh guard shared by caches that support `reload_now`

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::MutexGuard;

use super::{CacheError, CacheResult};
use crate::scheduler::Task;

/// Serializes refreshes of one cache and remembers how the last one ended
#[derive(Debug, Default)]
pub(crate) struct ReloadState {
    lock: tokio::sync::Mutex<()>,
    last_error: Mutex<Option<Arc<CacheError>>>,
}

impl ReloadState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold off refreshes, e.g. while loading from disk
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Run `refresh` under the lock and record its outcome before releasing it
    pub(crate) async fn run<Fut>(&self, refresh: Fut) -> CacheResult<()>
    where
        Fut: Future<Output = CacheResult<()>>,
    {
        let _guard = self.lock.lock().await;
        match refresh.await {
            Ok(()) => {
                *self.error_slot() = None;
                Ok(())
            }
            Err(e) => {
                let e = Arc::new(e);
                *self.error_slot() = Some(e.clone());
                Err(CacheError::RefreshFailed(e))
            }
        }
    }

    /// Trigger `task` now, or join the refresh already in flight, then
    /// report the outcome of the last refresh.
    pub(crate) async fn reload_with(&self, task: &Task) -> CacheResult<()> {
        let refreshing = self.lock.try_lock().is_err();
        if refreshing {
            drop(self.lock.lock().await);
        } else {
            task.manual_trigger(None).await;
        }

        match self.last_error() {
            Some(e) => Err(CacheError::RefreshFailed(e)),
            None => Ok(()),
        }
    }

    pub(crate) fn last_error(&self) -> Option<Arc<CacheError>> {
        self.error_slot().clone()
    }

    fn error_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<CacheError>>> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
