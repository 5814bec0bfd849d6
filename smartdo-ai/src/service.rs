//! `AiService`: the rate-limited surface callers use.
//!
//! Each call is charged to a caller key before any work is done. A rejected
//! call never reaches the cache or the backend.

use chrono::{DateTime, Utc};
use smartdo_core::{ContextEntry, PriorityResult, RecordStore, Suggestion, TaskId, TaskPayload};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::Completer;
use crate::error::{RateLimitError, ServiceError};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{BatchItem, PipelineOptions, PipelineResult, PipelineRunner, RankedTask};
use crate::rate_limit::{RateLimitConfig, RateLimiter};

pub struct AiService<C, S> {
    runner: PipelineRunner<C, S>,
    limiter: Arc<RateLimiter>,
}

impl<C, S> AiService<C, S>
where
    C: Completer + 'static,
    S: RecordStore + 'static,
{
    pub fn new(runner: PipelineRunner<C, S>, limits: RateLimitConfig) -> Self {
        Self {
            runner,
            limiter: Arc::new(RateLimiter::new(limits)),
        }
    }

    pub fn runner(&self) -> &PipelineRunner<C, S> {
        &self.runner
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn orchestrator(&self) -> &Orchestrator<C> {
        self.runner.orchestrator()
    }

    pub async fn analyze_priority(
        &self,
        caller: &str,
        task: &TaskPayload,
        context: &[ContextEntry],
    ) -> Result<Suggestion<PriorityResult>, RateLimitError> {
        self.limiter.check(caller)?;
        Ok(self.orchestrator().analyze_priority(task, context).await)
    }

    pub async fn suggest_deadline(
        &self,
        caller: &str,
        task: &TaskPayload,
        workload: u32,
    ) -> Result<Suggestion<DateTime<Utc>>, RateLimitError> {
        self.limiter.check(caller)?;
        Ok(self.orchestrator().suggest_deadline(task, workload).await)
    }

    pub async fn enhance_description(
        &self,
        caller: &str,
        task: &TaskPayload,
        context: &[ContextEntry],
    ) -> Result<Suggestion<String>, RateLimitError> {
        self.limiter.check(caller)?;
        Ok(self.orchestrator().enhance_description(task, context).await)
    }

    pub async fn suggest_categories(
        &self,
        caller: &str,
        task: &TaskPayload,
        context: &[ContextEntry],
        known_categories: &BTreeSet<String>,
    ) -> Result<Suggestion<Vec<String>>, RateLimitError> {
        self.limiter.check(caller)?;
        Ok(self
            .orchestrator()
            .suggest_categories(task, context, known_categories)
            .await)
    }

    pub async fn run_pipeline(
        &self,
        caller: &str,
        task_id: TaskId,
        options: PipelineOptions,
    ) -> Result<PipelineResult, ServiceError> {
        self.limiter.check(caller)?;
        Ok(self.runner.run_pipeline(task_id, options).await?)
    }

    /// One rate-limit charge for the whole batch.
    pub async fn run_batch(
        &self,
        caller: &str,
        task_ids: &[TaskId],
        options: PipelineOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<BatchItem>, ServiceError> {
        self.limiter.check(caller)?;
        Ok(self.runner.run_batch(task_ids, options, cancel).await)
    }

    pub async fn prioritize(
        &self,
        caller: &str,
        task_ids: Option<&[TaskId]>,
        limit: usize,
    ) -> Result<Vec<RankedTask>, ServiceError> {
        self.limiter.check(caller)?;
        Ok(self.runner.prioritize(task_ids, limit).await?)
    }

    /// Stored context, most-recent-first, as the operations consume it.
    pub async fn recent_context(&self) -> Result<Vec<ContextEntry>, ServiceError> {
        Ok(self.runner.recent_context().await?)
    }
}
