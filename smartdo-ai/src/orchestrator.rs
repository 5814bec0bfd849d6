//! The four AI operations behind one cache.
//!
//! Every operation follows the same path:
//! fingerprint → cache hit? → prompt → completion → parse → cache → answer.
//!
//! Backend failures and unreadable answers become fallback values, never
//! errors. Only real model answers are cached, so an outage does not pin a
//! fallback in the cache for the whole TTL.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use smartdo_core::{
    build_category_prompt, build_deadline_prompt, build_enhancement_prompt,
    build_priority_prompt, cache_ttl, default_deadline, default_tags, fingerprint,
    parse_deadline, parse_priority, parse_tags, parse_text, recent_slice, CachedValue,
    ContextEntry, FallbackReason, Fingerprint, Operation, Parsed, PriorityResult, ResultCache,
    Suggestion, TaskPayload,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{Backend, Completer};

/// Fingerprint arguments for `suggest_deadline`. The zone decides how naive
/// answers are read, so it is part of the key.
#[derive(Serialize)]
struct DeadlineArgs<'a> {
    workload: u32,
    timezone: &'a str,
}

/// Fingerprint arguments for `suggest_categories`.
#[derive(Serialize)]
struct CategoryArgs<'a> {
    context: &'a [ContextEntry],
    known_categories: Vec<&'a str>,
}

pub struct Orchestrator<C> {
    completer: C,
    backend: Backend,
    cache: Arc<ResultCache>,
    timezone: Tz,
    ttl: Duration,
}

impl<C: Completer> Orchestrator<C> {
    pub fn new(completer: C, backend: Backend, cache: Arc<ResultCache>) -> Self {
        Self {
            completer,
            backend,
            cache,
            timezone: Tz::UTC,
            ttl: cache_ttl(),
        }
    }

    /// Zone used to read naive deadlines written by the model.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn completer(&self) -> &C {
        &self.completer
    }

    pub async fn analyze_priority(
        &self,
        task: &TaskPayload,
        context: &[ContextEntry],
    ) -> Suggestion<PriorityResult> {
        let op = Operation::Priority;
        let context = recent_slice(context);
        let fp = fingerprint(op, task, context);
        if let Some(CachedValue::Priority(p)) = self.cached(op, &fp) {
            return Suggestion::cached(p);
        }

        let prompt = build_priority_prompt(task, context);
        let parsed = match self.completer.complete(&prompt, self.backend).await {
            Ok(raw) => parse_priority(&raw),
            Err(e) => Parsed::fallback(PriorityResult::default(), FallbackReason::Backend(e.to_string())),
        };
        self.settle(op, fp, parsed, CachedValue::Priority)
    }

    pub async fn suggest_deadline(
        &self,
        task: &TaskPayload,
        workload: u32,
    ) -> Suggestion<DateTime<Utc>> {
        let op = Operation::Deadline;
        let args = DeadlineArgs {
            workload,
            timezone: self.timezone.name(),
        };
        let fp = fingerprint(op, task, &args);
        if let Some(CachedValue::Deadline(d)) = self.cached(op, &fp) {
            return Suggestion::cached(d);
        }

        let prompt = build_deadline_prompt(task, workload);
        let result = self.completer.complete(&prompt, self.backend).await;
        let now = Utc::now();
        let parsed = match result {
            Ok(raw) => parse_deadline(&raw, now, self.timezone),
            Err(e) => Parsed::fallback(default_deadline(now), FallbackReason::Backend(e.to_string())),
        };
        self.settle(op, fp, parsed, CachedValue::Deadline)
    }

    /// On backend failure the value is the error text itself; check it with
    /// `smartdo_core::is_error_marker` before trusting it.
    pub async fn enhance_description(
        &self,
        task: &TaskPayload,
        context: &[ContextEntry],
    ) -> Suggestion<String> {
        let op = Operation::Enhance;
        let context = recent_slice(context);
        let fp = fingerprint(op, task, context);
        if let Some(CachedValue::Text(t)) = self.cached(op, &fp) {
            return Suggestion::cached(t);
        }

        let prompt = build_enhancement_prompt(task, context);
        let parsed = match self.completer.complete(&prompt, self.backend).await {
            Ok(raw) => parse_text(&raw, &task.description),
            Err(e) => {
                let marker = e.to_string();
                Parsed::fallback(marker.clone(), FallbackReason::Backend(marker))
            }
        };
        self.settle(op, fp, parsed, CachedValue::Text)
    }

    pub async fn suggest_categories(
        &self,
        task: &TaskPayload,
        context: &[ContextEntry],
        known_categories: &BTreeSet<String>,
    ) -> Suggestion<Vec<String>> {
        let op = Operation::Categories;
        let context = recent_slice(context);
        let args = CategoryArgs {
            context,
            known_categories: known_categories.iter().map(String::as_str).collect(),
        };
        let fp = fingerprint(op, task, &args);
        if let Some(CachedValue::Tags(t)) = self.cached(op, &fp) {
            return Suggestion::cached(t);
        }

        let known: Vec<String> = known_categories.iter().cloned().collect();
        let prompt = build_category_prompt(task, context, &known);
        let parsed = match self.completer.complete(&prompt, self.backend).await {
            Ok(raw) => parse_tags(&raw),
            Err(e) => Parsed::fallback(default_tags(), FallbackReason::Backend(e.to_string())),
        };
        self.settle(op, fp, parsed, CachedValue::Tags)
    }

    fn cached(&self, op: Operation, fp: &Fingerprint) -> Option<CachedValue> {
        let hit = self.cache.get(fp);
        debug!(%op, fingerprint = %fp, hit = hit.is_some(), "cache lookup");
        hit
    }

    fn settle<T: Clone>(
        &self,
        op: Operation,
        fp: Fingerprint,
        parsed: Parsed<T>,
        wrap: impl FnOnce(T) -> CachedValue,
    ) -> Suggestion<T> {
        match parsed.fallback {
            None => {
                self.cache.set(fp, wrap(parsed.value.clone()), self.ttl);
                Suggestion::model(parsed.value)
            }
            Some(reason) => {
                warn!(%op, backend = ?self.backend, %reason, "using fallback; not cached");
                Suggestion::fallback(parsed.value, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use smartdo_core::{Provenance, SourceType};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers and records prompts.
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<Result<String, BackendError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<String, BackendError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Completer for Scripted {
        async fn complete(&self, prompt: &str, _backend: Backend) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn down() -> BackendError {
        BackendError::Unavailable {
            backend: Backend::Local,
            reason: "connection refused".into(),
        }
    }

    fn orchestrator(answers: Vec<Result<String, BackendError>>) -> Orchestrator<Scripted> {
        Orchestrator::new(Scripted::new(answers), Backend::Local, Arc::new(ResultCache::new()))
    }

    fn ship() -> TaskPayload {
        TaskPayload::new("Ship release", "cut v1.2", "Work")
    }

    #[tokio::test]
    async fn priority_end_to_end_then_cache_hit() {
        let o = orchestrator(vec![Ok(
            r#"... {"priority_score": 7.5, "priority_level": 3, "reasoning": "deadline pressure"} ..."#
                .to_string(),
        )]);

        let first = o.analyze_priority(&ship(), &[]).await;
        assert_eq!(first.provenance, Provenance::Model);
        assert_eq!(
            first.value,
            PriorityResult {
                priority_score: 7.5,
                priority_level: 3,
                reasoning: "deadline pressure".into()
            }
        );

        let second = o.analyze_priority(&ship(), &[]).await;
        assert!(second.is_cached());
        assert_eq!(
            serde_json::to_string(&second.value).unwrap(),
            serde_json::to_string(&first.value).unwrap()
        );
        assert_eq!(o.completer().calls(), 1);
    }

    #[tokio::test]
    async fn context_beyond_five_entries_does_not_split_cache() {
        let answer = r#"{"priority_score": 4, "priority_level": 2, "reasoning": "ok"}"#;
        let o = orchestrator(vec![Ok(answer.into()), Ok(answer.into())]);
        let mut ctx: Vec<ContextEntry> = (0..5)
            .map(|i| ContextEntry::new(SourceType::Notes, format!("n{i}")))
            .collect();
        o.analyze_priority(&ship(), &ctx).await;
        ctx.push(ContextEntry::new(SourceType::Notes, "older"));
        assert!(o.analyze_priority(&ship(), &ctx).await.is_cached());

        ctx.insert(0, ContextEntry::new(SourceType::Email, "newest"));
        assert!(!o.analyze_priority(&ship(), &ctx).await.is_cached());
        assert_eq!(o.completer().calls(), 2);
    }

    #[tokio::test]
    async fn backend_failure_falls_back_and_is_not_cached() {
        let o = orchestrator(vec![
            Err(down()),
            Ok(r#"{"priority_score": 9, "priority_level": 4, "reasoning": "urgent"}"#.into()),
        ]);

        let first = o.analyze_priority(&ship(), &[]).await;
        assert_eq!(first.value, PriorityResult::default());
        assert!(matches!(first.provenance, Provenance::Fallback(FallbackReason::Backend(_))));
        assert!(o.cache().is_empty());

        let second = o.analyze_priority(&ship(), &[]).await;
        assert_eq!(second.value.priority_level, 4);
        assert_eq!(o.completer().calls(), 2);
    }

    #[tokio::test]
    async fn enhance_returns_error_marker_on_outage() {
        let o = orchestrator(vec![Err(down()), Ok("  Tag v1.2, then publish notes.  ".into())]);

        let failed = o.enhance_description(&ship(), &[]).await;
        assert!(smartdo_core::is_error_marker(&failed.value));
        assert!(failed.is_fallback());

        let ok = o.enhance_description(&ship(), &[]).await;
        assert_eq!(ok.value, "Tag v1.2, then publish notes.");
        assert_eq!(ok.provenance, Provenance::Model);

        assert!(o.enhance_description(&ship(), &[]).await.is_cached());
        assert_eq!(o.completer().calls(), 2);
    }

    #[tokio::test]
    async fn deadline_fallback_and_workload_in_fingerprint() {
        let o = orchestrator(vec![
            Ok("I think next week".into()),
            Ok(r#"{"suggested_deadline": "2030-01-15 17:00:00"}"#.into()),
            Ok(r#"{"suggested_deadline": "2030-01-20 17:00:00"}"#.into()),
        ]);

        let fb = o.suggest_deadline(&ship(), 3).await;
        assert!(fb.is_fallback());
        let expected = Utc::now() + Duration::days(7);
        assert!((fb.value - expected).num_seconds().abs() <= 1);

        let d3 = o.suggest_deadline(&ship(), 3).await;
        assert_eq!(d3.value.to_rfc3339(), "2030-01-15T17:00:00+00:00");
        let d5 = o.suggest_deadline(&ship(), 5).await;
        assert_eq!(d5.value.to_rfc3339(), "2030-01-20T17:00:00+00:00");
        assert!(o.suggest_deadline(&ship(), 3).await.is_cached());
        assert_eq!(o.completer().calls(), 3);
    }

    #[tokio::test]
    async fn deadline_cache_is_split_by_timezone() {
        let cache = Arc::new(ResultCache::new());
        let answer = r#"{"suggested_deadline": "2030-01-15 17:00:00"}"#;
        let utc = Orchestrator::new(
            Scripted::new(vec![Ok(answer.into())]),
            Backend::Local,
            cache.clone(),
        );
        let chicago = Orchestrator::new(
            Scripted::new(vec![Ok(answer.into())]),
            Backend::Local,
            cache.clone(),
        )
        .with_timezone(chrono_tz::America::Chicago);

        let d_utc = utc.suggest_deadline(&ship(), 3).await;
        assert_eq!(d_utc.value.to_rfc3339(), "2030-01-15T17:00:00+00:00");

        let d_chi = chicago.suggest_deadline(&ship(), 3).await;
        assert!(!d_chi.is_cached());
        assert_eq!(d_chi.value.to_rfc3339(), "2030-01-15T23:00:00+00:00");
        assert_eq!(chicago.completer().calls(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn categories_prompt_lists_known_and_parses_tags() {
        let o = orchestrator(vec![Ok(r#"["Work", "Release"]"#.into())]);
        let known: BTreeSet<String> = ["Work", "Home"].iter().map(|s| s.to_string()).collect();

        let tags = o.suggest_categories(&ship(), &[], &known).await;
        assert_eq!(tags.value, vec!["Work".to_string(), "Release".to_string()]);
        let prompt = o.completer().prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(r#"["Home", "Work"]"#));

        let more: BTreeSet<String> = ["Work", "Home", "Errands"].iter().map(|s| s.to_string()).collect();
        let fallback = o.suggest_categories(&ship(), &[], &more).await;
        assert_eq!(fallback.value, vec!["General".to_string()]);
        assert_eq!(o.completer().calls(), 2);
    }
}
