//! PipelineRunner: the four orchestrator stages run against a stored task.
//!
//! Per task the run is linear:
//! Start → PriorityComputed → DeadlineComputed → DescriptionEnhanced →
//! CategoriesSuggested → (AutoApplied) → Done
//!
//! Stages cannot fail (the orchestrator always answers), so the only errors
//! are store errors and unknown task ids. Batch runs fetch context and
//! category names once, fan out across a bounded worker pool and report
//! failures per item.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use smartdo_core::{
    is_error_marker, ContextEntry, PriorityResult, RecordStore, TaskId, TaskRecord,
    RECENT_CONTEXT_LIMIT,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Completer;
use crate::error::PipelineError;
use crate::orchestrator::Orchestrator;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_PRIORITIZE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    PriorityComputed,
    DeadlineComputed,
    DescriptionEnhanced,
    CategoriesSuggested,
    AutoApplied,
    Done,
}

impl Stage {
    fn next(self, auto_apply: bool) -> Stage {
        match self {
            Stage::Start => Stage::PriorityComputed,
            Stage::PriorityComputed => Stage::DeadlineComputed,
            Stage::DeadlineComputed => Stage::DescriptionEnhanced,
            Stage::DescriptionEnhanced => Stage::CategoriesSuggested,
            Stage::CategoriesSuggested if auto_apply => Stage::AutoApplied,
            Stage::CategoriesSuggested | Stage::AutoApplied | Stage::Done => Stage::Done,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Write the suggestions back onto the task record.
    pub auto_apply: bool,
    /// Active task count for the deadline prompt; defaults to pending tasks.
    pub current_workload: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub task_id: TaskId,
    pub priority: PriorityResult,
    pub suggested_deadline: DateTime<Utc>,
    pub enhanced_description: String,
    pub suggested_tags: Vec<String>,
    pub auto_applied: bool,
    /// Stages whose answer is a fallback default.
    pub fallbacks: Vec<Stage>,
    /// The task as stored after the run.
    pub task: TaskRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub task_id: TaskId,
    pub outcome: Result<PipelineResult, PipelineError>,
}

impl Serialize for BatchItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("task_id", &self.task_id)?;
        match &self.outcome {
            Ok(result) => map.serialize_entry("result", result)?,
            Err(e) => map.serialize_entry("error", &e.to_string())?,
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTask {
    pub task: TaskRecord,
    pub priority: PriorityResult,
}

/// Read-only inputs shared by every task in one run.
#[derive(Debug, Clone)]
struct SharedInputs {
    context: Vec<ContextEntry>,
    known_categories: BTreeSet<String>,
    workload: u32,
}

pub struct PipelineRunner<C, S> {
    orchestrator: Arc<Orchestrator<C>>,
    store: Arc<S>,
    concurrency: usize,
}

impl<C, S> Clone for PipelineRunner<C, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            store: self.store.clone(),
            concurrency: self.concurrency,
        }
    }
}

impl<C, S> PipelineRunner<C, S>
where
    C: Completer + 'static,
    S: RecordStore + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<C>>, store: Arc<S>) -> Self {
        Self {
            orchestrator,
            store,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    /// Max tasks analysed at once in `run_batch`.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<C>> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn recent_context(&self) -> Result<Vec<ContextEntry>, PipelineError> {
        Ok(self.store.list_recent_context(RECENT_CONTEXT_LIMIT).await?)
    }

    async fn shared_inputs(&self, options: PipelineOptions) -> Result<SharedInputs, PipelineError> {
        let context = self.recent_context().await?;
        let known_categories = self.store.list_category_names().await?;
        let workload = match options.current_workload {
            Some(w) => w,
            None => u32::try_from(self.store.count_pending().await?).unwrap_or(u32::MAX),
        };
        Ok(SharedInputs {
            context,
            known_categories,
            workload,
        })
    }

    pub async fn run_pipeline(
        &self,
        task_id: TaskId,
        options: PipelineOptions,
    ) -> Result<PipelineResult, PipelineError> {
        let inputs = self.shared_inputs(options).await?;
        self.run_one(task_id, &inputs, options.auto_apply).await
    }

    async fn run_one(
        &self,
        task_id: TaskId,
        inputs: &SharedInputs,
        auto_apply: bool,
    ) -> Result<PipelineResult, PipelineError> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(PipelineError::TaskNotFound(task_id))?;
        let payload = task.to_payload();
        let orch = &self.orchestrator;
        let mut fallbacks = Vec::new();
        let mut stage = Stage::Start;

        let priority = orch.analyze_priority(&payload, &inputs.context).await;
        stage = advance(task_id, stage, auto_apply);
        if priority.is_fallback() {
            fallbacks.push(stage);
        }

        let deadline = orch.suggest_deadline(&payload, inputs.workload).await;
        stage = advance(task_id, stage, auto_apply);
        if deadline.is_fallback() {
            fallbacks.push(stage);
        }

        let enhanced = orch.enhance_description(&payload, &inputs.context).await;
        stage = advance(task_id, stage, auto_apply);
        if enhanced.is_fallback() {
            fallbacks.push(stage);
        }

        let tags = orch
            .suggest_categories(&payload, &inputs.context, &inputs.known_categories)
            .await;
        for tag in &tags.value {
            self.store.get_or_create_category(tag).await?;
        }
        stage = advance(task_id, stage, auto_apply);
        if tags.is_fallback() {
            fallbacks.push(stage);
        }

        if auto_apply {
            task.priority_score = priority.value.priority_score;
            task.priority = priority.value.priority_level;
            task.deadline = Some(deadline.value);
            if !is_error_marker(&enhanced.value) {
                task.ai_enhanced_description = enhanced.value.clone();
            }
            if !tags.value.is_empty() {
                task.context_tags = tags.value.clone();
            }
            task.updated_at = Utc::now();
            self.store.save_task(task.clone()).await?;
            for tag in &tags.value {
                self.store.increment_usage(tag).await?;
            }
            stage = advance(task_id, stage, auto_apply);
        }

        let stage = advance(task_id, stage, auto_apply);
        debug_assert_eq!(stage, Stage::Done);

        Ok(PipelineResult {
            task_id,
            priority: priority.value,
            suggested_deadline: deadline.value,
            enhanced_description: enhanced.value,
            suggested_tags: tags.value,
            auto_applied: auto_apply,
            fallbacks,
            task,
        })
    }

    /// Run the pipeline over many tasks. Always returns one item per id, in
    /// input order.
    ///
    /// Cancelling `cancel` stops new tasks from starting (they report
    /// `Cancelled`); tasks already running finish.
    pub async fn run_batch(
        &self,
        task_ids: &[TaskId],
        options: PipelineOptions,
        cancel: &CancellationToken,
    ) -> Vec<BatchItem> {
        let inputs = match self.shared_inputs(options).await {
            Ok(i) => Arc::new(i),
            Err(e) => {
                warn!(error = %e, "batch inputs unavailable");
                return task_ids
                    .iter()
                    .map(|&task_id| BatchItem {
                        task_id,
                        outcome: Err(e.clone()),
                    })
                    .collect();
            }
        };

        info!(tasks = task_ids.len(), workers = self.concurrency, "batch pipeline started");

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut slots: Vec<Option<Result<PipelineResult, PipelineError>>> =
            (0..task_ids.len()).map(|_| None).collect();
        let mut running = JoinSet::new();

        for (idx, &task_id) in task_ids.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                p = permits.clone().acquire_owned() => p.ok(),
            };
            let Some(permit) = permit else {
                slots[idx] = Some(Err(PipelineError::Cancelled));
                continue;
            };

            let runner = self.clone();
            let inputs = inputs.clone();
            let auto_apply = options.auto_apply;
            running.spawn(async move {
                let _permit = permit;
                (idx, runner.run_one(task_id, &inputs, auto_apply).await)
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((idx, outcome)) => slots[idx] = Some(outcome),
                Err(e) => warn!(error = %e, "pipeline worker failed"),
            }
        }

        let items: Vec<BatchItem> = task_ids
            .iter()
            .zip(slots)
            .map(|(&task_id, slot)| BatchItem {
                task_id,
                outcome: slot.unwrap_or_else(|| {
                    Err(PipelineError::Internal("pipeline worker aborted".to_string()))
                }),
            })
            .collect();

        let failed = items.iter().filter(|i| i.outcome.is_err()).count();
        info!(tasks = items.len(), failed, "batch pipeline finished");
        items
    }

    /// Rank tasks by analysed priority, highest first.
    ///
    /// `task_ids = None` ranks every open task; unknown ids are skipped.
    pub async fn prioritize(
        &self,
        task_ids: Option<&[TaskId]>,
        limit: usize,
    ) -> Result<Vec<RankedTask>, PipelineError> {
        let tasks: Vec<TaskRecord> = match task_ids {
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for &id in ids {
                    match self.store.get_task(id).await? {
                        Some(t) => found.push(t),
                        None => debug!(task_id = id, "prioritize: unknown task skipped"),
                    }
                }
                found
            }
            None => self
                .store
                .list_tasks()
                .await?
                .into_iter()
                .filter(TaskRecord::is_open)
                .collect(),
        };

        let context = self.recent_context().await?;
        let mut ranked = Vec::with_capacity(tasks.len());
        for task in tasks {
            let priority = self
                .orchestrator
                .analyze_priority(&task.to_payload(), &context)
                .await;
            ranked.push(RankedTask {
                task,
                priority: priority.value,
            });
        }

        ranked.sort_by(|a, b| b.priority.priority_score.total_cmp(&a.priority.priority_score));
        ranked.truncate(limit);
        Ok(ranked)
    }
}

fn advance(task_id: TaskId, from: Stage, auto_apply: bool) -> Stage {
    let to = from.next(auto_apply);
    debug!(task_id, ?from, ?to, "pipeline stage");
    to
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_always_reaches_done() {
        for auto_apply in [false, true] {
            let mut s = Stage::Start;
            let mut seen = vec![s];
            while s != Stage::Done {
                s = s.next(auto_apply);
                seen.push(s);
                assert!(seen.len() <= 7);
            }
            assert_eq!(seen.contains(&Stage::AutoApplied), auto_apply);
        }
    }

    #[test]
    fn batch_item_serializes_result_or_error() {
        let item = BatchItem {
            task_id: 999,
            outcome: Err(PipelineError::TaskNotFound(999)),
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["task_id"], 999);
        assert_eq!(v["error"], "task 999 not found");
        assert!(v.get("result").is_none());
    }
}
