//! Reporting over stored tasks and user corrections to suggested tags.
//!
//! The summaries are pure functions over records; the async entry points at
//! the bottom pull the records from a store first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::store::{CorrectionStore, StoreError, TaskStore};
use crate::task::{TaskId, TaskRecord};

pub const TOP_CATEGORIES_LIMIT: usize = 5;
pub const CORRECTIONS_LIMIT: usize = 10;
pub const POPULAR_CATEGORIES_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("new_tags is required")]
    NoNewTags,
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// How much of the task list the AI has touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiAnalytics {
    pub total_tasks: usize,
    /// Tasks with a non-empty enhanced description.
    pub ai_enhanced_tasks: usize,
    /// Mean over all tasks, rounded to two places; 0 with no tasks.
    pub average_priority_score: f64,
    pub tasks_with_deadline: usize,
    pub top_categories: Vec<CategoryCount>,
}

/// A user replacing one suggested tag with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCorrection {
    pub task_id: TaskId,
    pub old_category: Option<String>,
    pub new_category: String,
    pub corrected_at: DateTime<Utc>,
}

impl CategoryCorrection {
    /// Pair `old_tags` with `new_tags` position by position; extra tags on
    /// either side are dropped. Blank old tags are stored as `None`.
    pub fn from_tags(
        task_id: TaskId,
        old_tags: &[String],
        new_tags: &[String],
        corrected_at: DateTime<Utc>,
    ) -> Result<Vec<Self>, AnalyticsError> {
        if new_tags.is_empty() {
            return Err(AnalyticsError::NoNewTags);
        }
        Ok(old_tags
            .iter()
            .zip(new_tags)
            .map(|(old, new)| Self {
                task_id,
                old_category: Some(old.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                new_category: new.clone(),
                corrected_at,
            })
            .collect())
    }

    fn pair(&self) -> Option<(&str, &str)> {
        let old = self.old_category.as_deref().filter(|s| !s.is_empty())?;
        let new = Some(self.new_category.as_str()).filter(|s| !s.is_empty())?;
        Some((old, new))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionCount {
    pub old_category: String,
    pub new_category: String,
    pub count: usize,
}

/// Highest count first; ties keep the order in which each key first appeared.
fn most_common<K: Eq + std::hash::Hash + Clone>(
    keys: impl IntoIterator<Item = K>,
    limit: usize,
) -> Vec<(K, usize)> {
    let mut order: Vec<K> = Vec::new();
    let mut counts: HashMap<K, usize> = HashMap::new();
    for k in keys {
        let n = counts.entry(k.clone()).or_insert(0);
        if *n == 0 {
            order.push(k);
        }
        *n += 1;
    }
    let mut out: Vec<(K, usize)> = order
        .into_iter()
        .map(|k| {
            let n = counts[&k];
            (k, n)
        })
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out.truncate(limit);
    out
}

pub fn summarize(tasks: &[TaskRecord]) -> AiAnalytics {
    let total_tasks = tasks.len();
    let average_priority_score = if total_tasks == 0 {
        0.0
    } else {
        let mean = tasks.iter().map(|t| t.priority_score).sum::<f64>() / total_tasks as f64;
        (mean * 100.0).round() / 100.0
    };
    let top_categories = most_common(
        tasks.iter().filter_map(|t| t.category.as_deref()),
        TOP_CATEGORIES_LIMIT,
    )
    .into_iter()
    .map(|(category, count)| CategoryCount {
        category: category.to_string(),
        count,
    })
    .collect();

    AiAnalytics {
        total_tasks,
        ai_enhanced_tasks: tasks
            .iter()
            .filter(|t| !t.ai_enhanced_description.is_empty())
            .count(),
        average_priority_score,
        tasks_with_deadline: tasks.iter().filter(|t| t.deadline.is_some()).count(),
        top_categories,
    }
}

/// Only corrections with both sides present are counted.
pub fn most_common_corrections(
    corrections: &[CategoryCorrection],
    limit: usize,
) -> Vec<CorrectionCount> {
    most_common(corrections.iter().filter_map(CategoryCorrection::pair), limit)
        .into_iter()
        .map(|((old, new), count)| CorrectionCount {
            old_category: old.to_string(),
            new_category: new.to_string(),
            count,
        })
        .collect()
}

/// Pairs corrected at least `min_count` times; candidates for prompt tuning.
pub fn frequent_corrections(
    corrections: &[CategoryCorrection],
    min_count: usize,
) -> Vec<CorrectionCount> {
    most_common_corrections(corrections, usize::MAX)
        .into_iter()
        .filter(|c| c.count >= min_count)
        .collect()
}

pub async fn ai_analytics<S>(store: &S) -> Result<AiAnalytics, AnalyticsError>
where
    S: TaskStore + ?Sized,
{
    Ok(summarize(&store.list_tasks().await?))
}

/// Record corrections for one task and return how many were stored.
pub async fn log_category_correction<S>(
    store: &S,
    task_id: TaskId,
    old_tags: &[String],
    new_tags: &[String],
) -> Result<usize, AnalyticsError>
where
    S: TaskStore + CorrectionStore + ?Sized,
{
    let corrections = CategoryCorrection::from_tags(task_id, old_tags, new_tags, Utc::now())?;
    if store.get_task(task_id).await?.is_none() {
        return Err(AnalyticsError::TaskNotFound(task_id));
    }
    let logged = corrections.len();
    store.log_corrections(corrections).await?;
    Ok(logged)
}

pub async fn correction_analytics<S>(
    store: &S,
    limit: usize,
) -> Result<Vec<CorrectionCount>, AnalyticsError>
where
    S: CorrectionStore + ?Sized,
{
    Ok(most_common_corrections(&store.list_corrections().await?, limit))
}
