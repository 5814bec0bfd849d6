//! File-backed record store: a `MemoryStore` saved to store.json after every
//! change.

use async_trait::async_trait;
use smartdo_core::{
    CategoryCorrection, CategoryId, CategoryRecord, CategoryStore, ContextEntry, ContextStore,
    CorrectionStore, MemoryStore, StoreError, StoreState, TaskId, TaskRecord, TaskStore,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

pub struct JsonStore {
    inner: MemoryStore,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let s = std::fs::read_to_string(&path)?;
            serde_json::from_str::<StoreState>(&s)?
        } else {
            StoreState::default()
        };
        debug!(path = %path.display(), tasks = state.tasks.len(), "store opened");
        Ok(Self {
            inner: MemoryStore::from_state(state),
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> StoreState {
        self.inner.snapshot()
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let body = serde_json::to_string_pretty(&self.inner.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn create_task(
        &self,
        title: &str,
        description: &str,
        category: Option<&str>,
    ) -> Result<TaskRecord, StoreError> {
        let task = self.inner.create_task(title, description, category);
        if let Some(name) = category {
            self.inner.add_category(name);
        }
        self.persist().await?;
        Ok(task)
    }

    pub async fn add_context(&self, entry: ContextEntry) -> Result<(), StoreError> {
        self.inner.add_context(entry);
        self.persist().await
    }
}

#[async_trait]
impl ContextStore for JsonStore {
    async fn list_recent_context(&self, limit: usize) -> Result<Vec<ContextEntry>, StoreError> {
        self.inner.list_recent_context(limit).await
    }
}

#[async_trait]
impl CategoryStore for JsonStore {
    async fn list_category_names(&self) -> Result<BTreeSet<String>, StoreError> {
        self.inner.list_category_names().await
    }

    async fn get_or_create_category(&self, name: &str) -> Result<CategoryId, StoreError> {
        let before = self.inner.categories().len();
        let id = self.inner.get_or_create_category(name).await?;
        if self.inner.categories().len() != before {
            self.persist().await?;
        }
        Ok(id)
    }

    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, StoreError> {
        self.inner.list_categories().await
    }

    async fn increment_usage(&self, name: &str) -> Result<u32, StoreError> {
        let count = self.inner.increment_usage(name).await?;
        self.persist().await?;
        Ok(count)
    }
}

#[async_trait]
impl CorrectionStore for JsonStore {
    async fn log_corrections(
        &self,
        corrections: Vec<CategoryCorrection>,
    ) -> Result<(), StoreError> {
        if corrections.is_empty() {
            return Ok(());
        }
        self.inner.log_corrections(corrections).await?;
        self.persist().await
    }

    async fn list_corrections(&self) -> Result<Vec<CategoryCorrection>, StoreError> {
        self.inner.list_corrections().await
    }
}

#[async_trait]
impl TaskStore for JsonStore {
    async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.get_task(id).await
    }

    async fn save_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        self.inner.save_task(task).await?;
        self.persist().await
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.list_tasks().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartdo_core::{correction_analytics, log_category_correction, SourceType};

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonStore::open(&path).unwrap();
        let task = store.create_task("Ship", "cut v1.2", Some("Work")).await.unwrap();
        store
            .add_context(ContextEntry::new(SourceType::Email, "release friday"))
            .await
            .unwrap();
        store.get_or_create_category("Release").await.unwrap();

        let mut edited = task.clone();
        edited.priority_score = 8.5;
        store.save_task(edited).await.unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        let got = reopened.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(got.priority_score, 8.5);
        let names = reopened.list_category_names().await.unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["Release", "Work"]);
        assert_eq!(reopened.list_recent_context(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn usage_and_corrections_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonStore::open(&path).unwrap();
        let task = store.create_task("Ship", "", Some("Work")).await.unwrap();
        store.increment_usage("Work").await.unwrap();
        store.increment_usage("Work").await.unwrap();
        let old = vec!["Work".to_string()];
        let new = vec!["Release".to_string()];
        log_category_correction(&store, task.id, &old, &new).await.unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        let popular = reopened.popular_categories(5).await.unwrap();
        assert_eq!(popular[0].name, "Work");
        assert_eq!(popular[0].usage_count, 2);
        let top = correction_analytics(&reopened, 10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].old_category, "Work");
        assert_eq!(top[0].new_category, "Release");
    }

    #[tokio::test]
    async fn saving_unknown_task_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonStore::open(&path).unwrap();
        let err = store.save_task(TaskRecord::new(7, "ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!path.exists());
    }
}
