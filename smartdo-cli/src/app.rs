//! Wires config, credentials, the store and the result cache into an
//! `AiService`, and runs the analysis commands.

use anyhow::{Context, Result};
use serde::Serialize;
use smartdo_ai::{AiService, InferenceClient, Orchestrator, PipelineOptions, PipelineRunner};
use smartdo_core::{CategoryStore, ResultCache, TaskId, TaskPayload, TaskStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::resolve_api_key;
use crate::config::load_config;
use crate::state::{
    cache_path, limits_path, load_cache, load_limits, save_cache, save_limits, store_path,
};
use crate::store::JsonStore;

/// Rate-limit key for everything this process does.
pub const CLI_CALLER: &str = "cli";

pub type CliService = AiService<InferenceClient, JsonStore>;

pub struct App {
    pub service: CliService,
    pub store: Arc<JsonStore>,
    cache: Arc<ResultCache>,
    cache_file: Option<PathBuf>,
    limits_file: PathBuf,
}

impl App {
    pub fn load() -> Result<Self> {
        let config = load_config()?;
        let timezone = config.timezone()?;
        let client = InferenceClient::new(config.client_config(resolve_api_key()?))
            .context("build HTTP client")?;

        let cache = Arc::new(ResultCache::new());
        let cache_file = if config.cache.persist {
            let p = cache_path()?;
            load_cache(&cache, &p)?;
            Some(p)
        } else {
            None
        };

        let store = Arc::new(JsonStore::open(store_path()?).context("open store.json")?);
        let orchestrator =
            Orchestrator::new(client, config.llm.backend, cache.clone()).with_timezone(timezone);
        let runner = PipelineRunner::new(Arc::new(orchestrator), store.clone())
            .with_concurrency(config.pipeline.batch_concurrency);
        let service = AiService::new(runner, config.rate_limits());
        let limits_file = limits_path()?;
        load_limits(service.limiter(), &limits_file)?;

        info!(backend = %config.llm.backend, %timezone, "smartdo ready");
        Ok(Self {
            service,
            store,
            cache,
            cache_file,
            limits_file,
        })
    }

    /// Save the rate-limit windows and the cache (if persistence is on),
    /// then hand back the command's result. A failed save only logs.
    pub fn finish(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = save_limits(self.service.limiter(), &self.limits_file) {
            warn!(error = %e, "could not save rate limits");
        }
        if let Some(p) = &self.cache_file {
            if let Err(e) = save_cache(&self.cache, p) {
                warn!(error = %e, "could not save result cache");
            }
        }
        result
    }

    async fn workload(&self, explicit: Option<u32>) -> Result<u32> {
        match explicit {
            Some(w) => Ok(w),
            None => Ok(u32::try_from(self.store.count_pending().await?).unwrap_or(u32::MAX)),
        }
    }

    pub async fn priority(&self, task: TaskPayload) -> Result<()> {
        task.validate()?;
        let ctx = self.service.recent_context().await?;
        let out = self.service.analyze_priority(CLI_CALLER, &task, &ctx).await?;
        print_json(&out)
    }

    pub async fn deadline(&self, task: TaskPayload, workload: Option<u32>) -> Result<()> {
        task.validate()?;
        let workload = self.workload(workload.or(task.current_workload)).await?;
        let out = self.service.suggest_deadline(CLI_CALLER, &task, workload).await?;
        print_json(&out)
    }

    pub async fn enhance(&self, task: TaskPayload) -> Result<()> {
        task.validate()?;
        let ctx = self.service.recent_context().await?;
        let out = self.service.enhance_description(CLI_CALLER, &task, &ctx).await?;
        print_json(&out)
    }

    pub async fn categories(&self, task: TaskPayload) -> Result<()> {
        task.validate()?;
        let ctx = self.service.recent_context().await?;
        let known = self.store.list_category_names().await?;
        let out = self
            .service
            .suggest_categories(CLI_CALLER, &task, &ctx, &known)
            .await?;
        print_json(&out)
    }

    pub async fn pipeline(&self, task_id: TaskId, options: PipelineOptions) -> Result<()> {
        let out = self.service.run_pipeline(CLI_CALLER, task_id, options).await?;
        print_json(&out)
    }

    /// Ctrl-C stops scheduling; tasks already running still finish.
    pub async fn batch(&self, task_ids: &[TaskId], options: PipelineOptions) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling remaining tasks");
                on_signal.cancel();
            }
        });

        let out = self
            .service
            .run_batch(CLI_CALLER, task_ids, options, &cancel)
            .await;
        watcher.abort();
        print_json(&out?)
    }

    pub async fn prioritize(&self, task_ids: &[TaskId], limit: usize) -> Result<()> {
        let ids = (!task_ids.is_empty()).then_some(task_ids);
        let out = self.service.prioritize(CLI_CALLER, ids, limit).await?;
        print_json(&out)
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
