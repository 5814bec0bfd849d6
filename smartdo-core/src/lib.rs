//! smartdo-core: types and pure building blocks of the task-analysis core.
//!
//! Nothing in this crate talks to the network. Prompts are built, model text
//! is parsed and results are memoized here; `smartdo-ai` does the I/O.

pub mod analytics;
pub mod cache;
pub mod fingerprint;
pub mod parser;
pub mod payload;
pub mod prompts;
pub mod results;
pub mod store;
pub mod task;
pub mod time;

pub use analytics::{
    ai_analytics, correction_analytics, frequent_corrections, log_category_correction,
    most_common_corrections, summarize, AiAnalytics, AnalyticsError, CategoryCorrection,
    CategoryCount, CorrectionCount, CORRECTIONS_LIMIT, POPULAR_CATEGORIES_LIMIT,
    TOP_CATEGORIES_LIMIT,
};
pub use cache::{cache_ttl, CacheEntry, CachedValue, ResultCache, CACHE_TTL_SECS};
pub use fingerprint::{fingerprint, Fingerprint, Operation};
pub use parser::{default_deadline, parse_deadline, parse_priority, parse_tags, parse_text};
pub use payload::{
    recent_slice, ContextEntry, PayloadError, SourceType, TaskPayload, DEFAULT_CATEGORY,
    RECENT_CONTEXT_LIMIT,
};
pub use prompts::{
    build_category_prompt, build_deadline_prompt, build_enhancement_prompt, build_priority_prompt,
    SYSTEM_PROMPT,
};
pub use results::{
    default_tags, is_error_marker, FallbackReason, Parsed, PriorityResult, Provenance, Suggestion,
    ERROR_MARKER,
};
pub use store::{
    CategoryStore, ContextStore, CorrectionStore, MemoryStore, RecordStore, StoreError,
    StoreState, StoredContext, TaskStore,
};
pub use task::{CategoryId, CategoryRecord, TaskId, TaskRecord, TaskStatus};
