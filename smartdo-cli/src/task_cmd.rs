use anyhow::{bail, Result};
use smartdo_core::{
    ai_analytics, frequent_corrections, log_category_correction, most_common_corrections,
    CategoryStore, ContextEntry, ContextStore, CorrectionStore, SourceType, TaskId, TaskRecord,
    TaskStatus, TaskStore,
};
use tracing::info;

use crate::app::print_json;
use crate::store::JsonStore;

pub async fn add_task(
    store: &JsonStore,
    title: &str,
    description: &str,
    category: Option<&str>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("task title must not be empty");
    }
    let task = store
        .create_task(title.trim(), description, category.map(str::trim))
        .await?;
    print_json(&task)
}

pub async fn list_tasks(store: &JsonStore, status: Option<TaskStatus>) -> Result<()> {
    let tasks: Vec<TaskRecord> = store
        .list_tasks()
        .await?
        .into_iter()
        .filter(|t| status.is_none_or(|s| t.status == s))
        .collect();
    print_json(&tasks)
}

pub async fn add_context(store: &JsonStore, source: SourceType, content: &str) -> Result<()> {
    let entry = ContextEntry::new(source, content);
    entry.validate()?;
    store.add_context(entry.clone()).await?;
    print_json(&entry)
}

pub async fn list_context(store: &JsonStore, limit: usize) -> Result<()> {
    print_json(&store.list_recent_context(limit).await?)
}

pub fn list_categories(store: &JsonStore) -> Result<()> {
    let mut categories = store.snapshot().categories;
    categories.sort_by(|a, b| a.name.cmp(&b.name));
    print_json(&categories)
}

pub async fn popular_categories(store: &JsonStore, limit: usize) -> Result<()> {
    print_json(&store.popular_categories(limit).await?)
}

pub async fn use_category(store: &JsonStore, name: &str) -> Result<()> {
    let usage_count = store.increment_usage(name.trim()).await?;
    print_json(&serde_json::json!({ "category": name.trim(), "usage_count": usage_count }))
}

pub async fn correct_categories(
    store: &JsonStore,
    task_id: TaskId,
    old_tags: &[String],
    new_tags: &[String],
) -> Result<()> {
    let logged = log_category_correction(store, task_id, old_tags, new_tags).await?;
    info!(task_id, logged, "category corrections logged");
    print_json(&serde_json::json!({ "task_id": task_id, "logged": logged }))
}

/// With `min_count`, only pairs seen at least that often are listed.
pub async fn list_corrections(
    store: &JsonStore,
    limit: usize,
    min_count: Option<usize>,
) -> Result<()> {
    let all = store.list_corrections().await?;
    let mut counts = match min_count {
        Some(n) => frequent_corrections(&all, n),
        None => most_common_corrections(&all, limit),
    };
    counts.truncate(limit);
    print_json(&serde_json::json!({ "most_common_corrections": counts }))
}

pub async fn analytics(store: &JsonStore) -> Result<()> {
    print_json(&ai_analytics(store).await?)
}
