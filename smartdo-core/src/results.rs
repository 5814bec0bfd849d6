//! Result types produced by the analysis core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix carried by every synthesized backend-failure answer.
pub const ERROR_MARKER: &str = "Error";

/// True when an enhanced description is really a backend failure message.
pub fn is_error_marker(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}

/// Tag list used when a model answer holds no usable tags.
pub fn default_tags() -> Vec<String> {
    vec!["General".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityResult {
    /// 0.0..=10.0
    pub priority_score: f64,
    /// 1=Low, 2=Medium, 3=High, 4=Critical
    pub priority_level: u8,
    pub reasoning: String,
}

impl Default for PriorityResult {
    fn default() -> Self {
        Self {
            priority_score: 5.0,
            priority_level: 2,
            reasoning: "Default priority".to_string(),
        }
    }
}

impl PriorityResult {
    pub fn level_label(&self) -> &'static str {
        match self.priority_level {
            1 => "Low",
            2 => "Medium",
            3 => "High",
            _ => "Critical",
        }
    }
}

/// Why a fallback default was substituted for a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The backend call itself failed.
    Backend(String),
    EmptyResponse,
    /// No `{...}` / `[...]` span in the answer.
    NoStructuredData,
    InvalidJson(String),
    /// JSON decoded but a field was missing or unusable.
    InvalidValue(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Backend(msg) => write!(f, "backend failure: {msg}"),
            FallbackReason::EmptyResponse => f.write_str("empty response"),
            FallbackReason::NoStructuredData => f.write_str("no structured data in response"),
            FallbackReason::InvalidJson(msg) => write!(f, "invalid json: {msg}"),
            FallbackReason::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
        }
    }
}

/// Parser output: always a usable value, plus the reason when it is a default.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub fallback: Option<FallbackReason>,
}

impl<T> Parsed<T> {
    pub fn ok(value: T) -> Self {
        Self { value, fallback: None }
    }

    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Self {
            value,
            fallback: Some(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Where an orchestrator answer came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "reason", rename_all = "snake_case")]
pub enum Provenance {
    Model,
    Cache,
    Fallback(FallbackReason),
}

/// An orchestrator answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Suggestion<T> {
    pub fn model(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Model,
        }
    }

    pub fn cached(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Cache,
        }
    }

    pub fn fallback(value: T, reason: FallbackReason) -> Self {
        Self {
            value,
            provenance: Provenance::Fallback(reason),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.provenance, Provenance::Fallback(_))
    }

    pub fn is_cached(&self) -> bool {
        self.provenance == Provenance::Cache
    }
}
