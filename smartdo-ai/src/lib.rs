//! smartdo-ai: talks to the model backends and runs the analysis pipeline.

pub mod client;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod rate_limit;
pub mod service;

pub use client::{Backend, ClientConfig, Completer, InferenceClient, REQUEST_TIMEOUT};
pub use error::{BackendError, PipelineError, RateLimitError, ServiceError};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    BatchItem, PipelineOptions, PipelineResult, PipelineRunner, RankedTask, Stage,
    DEFAULT_BATCH_CONCURRENCY, DEFAULT_PRIORITIZE_LIMIT,
};
pub use rate_limit::{RateLimitConfig, RateLimiter, WindowSnapshot};
pub use service::AiService;
