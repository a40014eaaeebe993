//! In-memory task registry
//!
//! Many workers write (one per task id), HTTP handlers and the retention
//! sweeper read. All access goes through the store's async lock; callers get
//! clones, never references into the map.

use crate::models::{Task, TaskId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, cloneable handle to the task map
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    /// Snapshot of one task
    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Apply `f` to the task under the write lock
    ///
    /// Returns `None` when the task no longer exists (e.g. swept).
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Task) -> R,
    {
        self.tasks.write().await.get_mut(id).map(f)
    }

    /// Snapshot of all tasks, oldest first
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub async fn remove(&self, id: &str) -> Option<Task> {
        self.tasks.write().await.remove(id)
    }

    /// Remove every task that started before `cutoff`, returning them
    pub async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Vec<Task> {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<TaskId> = tasks
            .values()
            .filter(|t| t.start_time < cutoff)
            .map(|t| t.id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| tasks.remove(&id))
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
