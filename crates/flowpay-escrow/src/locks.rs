use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type Scopes = Arc<SyncMutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// One serialization scope per project; unrelated projects never contend.
///
/// A project's entry lives only while a scope is held or awaited.
#[derive(Default)]
pub struct ProjectLocks {
    scopes: Scopes,
}

impl ProjectLocks {
    pub async fn acquire(&self, project_id: Uuid) -> ProjectScope {
        let scope = {
            let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
            scopes.entry(project_id).or_default().clone()
        };

        ProjectScope {
            guard: Some(scope.lock_owned().await),
            project_id,
            scopes: self.scopes.clone(),
        }
    }

    /// Projects with a scope currently held or awaited.
    pub fn len(&self) -> usize {
        self.scopes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held project scope. Dropping it releases the project and evicts its entry
/// once nobody else is waiting.
pub struct ProjectScope {
    guard: Option<OwnedMutexGuard<()>>,
    project_id: Uuid,
    scopes: Scopes,
}

impl Drop for ProjectScope {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's own handle is the last one: no holder, no waiter.
        if scopes
            .get(&self.project_id)
            .is_some_and(|scope| Arc::strong_count(scope) == 1)
        {
            scopes.remove(&self.project_id);
        }
    }
}
