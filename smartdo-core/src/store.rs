//! Record-store seams the pipeline talks to.
//!
//! Real adapters (a database, the CLI's JSON file) live outside the core.
//! `MemoryStore` is the reference implementation used by tests and wrapped
//! by the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::analytics::CategoryCorrection;
use crate::payload::ContextEntry;
use crate::task::{CategoryId, CategoryRecord, TaskId, TaskRecord, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Most-recent-first.
    async fn list_recent_context(&self, limit: usize) -> Result<Vec<ContextEntry>, StoreError>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_category_names(&self) -> Result<BTreeSet<String>, StoreError>;
    async fn get_or_create_category(&self, name: &str) -> Result<CategoryId, StoreError>;
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, StoreError>;

    /// Bump the usage count of an existing category and return the new count.
    async fn increment_usage(&self, name: &str) -> Result<u32, StoreError>;

    /// Most used first, ties by name.
    async fn popular_categories(&self, limit: usize) -> Result<Vec<CategoryRecord>, StoreError> {
        let mut all = self.list_categories().await?;
        all.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.name.cmp(&b.name)));
        all.truncate(limit);
        Ok(all)
    }
}

#[async_trait]
pub trait CorrectionStore: Send + Sync {
    async fn log_corrections(
        &self,
        corrections: Vec<CategoryCorrection>,
    ) -> Result<(), StoreError>;
    async fn list_corrections(&self) -> Result<Vec<CategoryCorrection>, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError>;
    async fn save_task(&self, task: TaskRecord) -> Result<(), StoreError>;
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn count_pending(&self) -> Result<usize, StoreError> {
        Ok(self
            .list_tasks()
            .await?
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count())
    }
}

/// Everything the pipeline needs from one backing store.
pub trait RecordStore: TaskStore + ContextStore + CategoryStore {}

impl<T: TaskStore + ContextStore + CategoryStore> RecordStore for T {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContext {
    pub entry: ContextEntry,
    pub created_at: DateTime<Utc>,
}

/// Serializable contents of a `MemoryStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, TaskRecord>,
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
    /// Most-recent-first.
    #[serde(default)]
    pub context: Vec<StoredContext>,
    #[serde(default)]
    pub corrections: Vec<CategoryCorrection>,
}

impl StoreState {
    fn next_task_id(&self) -> TaskId {
        self.tasks.keys().next_back().map_or(1, |id| id + 1)
    }

    fn next_category_id(&self) -> CategoryId {
        self.categories.iter().map(|c| c.id).max().map_or(1, |id| id + 1)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> StoreState {
        self.lock().clone()
    }

    /// Insert a task under a fresh id and return it.
    pub fn create_task(
        &self,
        title: &str,
        description: &str,
        category: Option<&str>,
    ) -> TaskRecord {
        let mut state = self.lock();
        let mut task = TaskRecord::new(state.next_task_id(), title).with_description(description);
        task.category = category.map(str::to_string);
        state.tasks.insert(task.id, task.clone());
        task
    }

    /// Insert (or replace) a task keeping its id.
    pub fn insert_task(&self, task: TaskRecord) {
        self.lock().tasks.insert(task.id, task);
    }

    pub fn add_context(&self, entry: ContextEntry) {
        self.add_context_at(entry, Utc::now());
    }

    pub fn add_context_at(&self, entry: ContextEntry, created_at: DateTime<Utc>) {
        let mut state = self.lock();
        state.context.push(StoredContext { entry, created_at });
        state.context.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    pub fn add_category(&self, name: &str) -> CategoryId {
        get_or_create(&mut self.lock(), name)
    }

    pub fn categories(&self) -> Vec<CategoryRecord> {
        self.lock().categories.clone()
    }
}

fn get_or_create(state: &mut StoreState, name: &str) -> CategoryId {
    if let Some(c) = state.categories.iter().find(|c| c.name == name) {
        return c.id;
    }
    let id = state.next_category_id();
    state.categories.push(CategoryRecord {
        id,
        name: name.to_string(),
        usage_count: 0,
    });
    id
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn list_recent_context(&self, limit: usize) -> Result<Vec<ContextEntry>, StoreError> {
        Ok(self
            .lock()
            .context
            .iter()
            .take(limit)
            .map(|c| c.entry.clone())
            .collect())
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn list_category_names(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.lock().categories.iter().map(|c| c.name.clone()).collect())
    }

    async fn get_or_create_category(&self, name: &str) -> Result<CategoryId, StoreError> {
        Ok(get_or_create(&mut self.lock(), name))
    }

    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, StoreError> {
        Ok(self.categories())
    }

    async fn increment_usage(&self, name: &str) -> Result<u32, StoreError> {
        let mut state = self.lock();
        let category = state
            .categories
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| StoreError::NotFound(format!("category {name}")))?;
        category.usage_count += 1;
        Ok(category.usage_count)
    }
}

#[async_trait]
impl CorrectionStore for MemoryStore {
    async fn log_corrections(
        &self,
        corrections: Vec<CategoryCorrection>,
    ) -> Result<(), StoreError> {
        self.lock().corrections.extend(corrections);
        Ok(())
    }

    async fn list_corrections(&self) -> Result<Vec<CategoryCorrection>, StoreError> {
        Ok(self.lock().corrections.clone())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn save_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.tasks.contains_key(&task.id) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        state.tasks.insert(task.id, task);
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.lock().tasks.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::SourceType;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn context_is_most_recent_first() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap();
        store.add_context_at(ContextEntry::new(SourceType::Email, "old"), t0);
        store.add_context_at(ContextEntry::new(SourceType::Notes, "new"), t0 + Duration::hours(1));
        store.add_context_at(ContextEntry::new(SourceType::Manual, "mid"), t0 + Duration::minutes(30));

        let recent = store.list_recent_context(2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.get_or_create_category("Work").await.unwrap();
        let b = store.get_or_create_category("Work").await.unwrap();
        let c = store.get_or_create_category("Home").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let names = store.list_category_names().await.unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["Home", "Work"]);
    }

    #[tokio::test]
    async fn usage_counts_drive_popular_categories() {
        let store = MemoryStore::new();
        for name in ["Work", "Home", "Errands", "Health", "Study", "Travel"] {
            store.add_category(name);
        }
        for _ in 0..3 {
            store.increment_usage("Home").await.unwrap();
        }
        assert_eq!(store.increment_usage("Travel").await.unwrap(), 1);
        assert!(matches!(
            store.increment_usage("Nope").await,
            Err(StoreError::NotFound(_))
        ));

        let popular: Vec<String> = store
            .popular_categories(5)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(popular, vec!["Home", "Travel", "Errands", "Health", "Study"]);
    }

    #[tokio::test]
    async fn tasks_get_sequential_ids_and_pending_count() {
        let store = MemoryStore::new();
        let a = store.create_task("a", "", None);
        let b = store.create_task("b", "", Some("Work"));
        assert_eq!((a.id, b.id), (1, 2));

        let done = b.clone().with_status(TaskStatus::Completed);
        store.save_task(done).await.unwrap();
        assert_eq!(store.count_pending().await.unwrap(), 1);

        let ghost = TaskRecord::new(99, "ghost");
        assert!(matches!(store.save_task(ghost).await, Err(StoreError::NotFound(_))));
        assert!(store.get_task(99).await.unwrap().is_none());
    }
}
