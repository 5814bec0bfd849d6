//! Typed inputs for the analysis core.
//!
//! Callers build these once at the boundary (HTTP handler, CLI flags, store
//! record) and the rest of the core only ever sees validated structs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How many context entries feed a prompt (and a fingerprint).
pub const RECENT_CONTEXT_LIMIT: usize = 5;

/// Per-entry character budget inside a prompt's context summary.
pub const CONTEXT_SNIPPET_CHARS: usize = 100;

/// Category used when a task has none.
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("title is required")]
    EmptyTitle,
    #[error("context content is required")]
    EmptyContext,
}

/// The task fields a model sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_workload: Option<u32>,
}

impl TaskPayload {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
            current_workload: None,
        }
    }

    pub fn with_workload(mut self, workload: u32) -> Self {
        self.current_workload = Some(workload);
        self
    }

    /// Category as rendered into prompts.
    pub fn category_or_default(&self) -> &str {
        let c = self.category.trim();
        if c.is_empty() { DEFAULT_CATEGORY } else { c }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.title.trim().is_empty() {
            return Err(PayloadError::EmptyTitle);
        }
        Ok(())
    }
}

/// Where a piece of context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Whatsapp,
    Email,
    Notes,
    Manual,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Whatsapp => "whatsapp",
            SourceType::Email => "email",
            SourceType::Notes => "notes",
            SourceType::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whatsapp" => Ok(SourceType::Whatsapp),
            "email" => Ok(SourceType::Email),
            "notes" => Ok(SourceType::Notes),
            "manual" => Ok(SourceType::Manual),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// A recent message, email or note the user captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub content: String,
    pub source_type: SourceType,
}

impl ContextEntry {
    pub fn new(source_type: SourceType, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_type,
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.content.trim().is_empty() {
            return Err(PayloadError::EmptyContext);
        }
        Ok(())
    }

    /// First `CONTEXT_SNIPPET_CHARS` characters (never splits a code point).
    pub fn snippet(&self) -> &str {
        match self.content.char_indices().nth(CONTEXT_SNIPPET_CHARS) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }
}

/// The most recent entries the core is allowed to read.
///
/// Input is most-recent-first, so this is a prefix.
pub fn recent_slice(entries: &[ContextEntry]) -> &[ContextEntry] {
    &entries[..entries.len().min(RECENT_CONTEXT_LIMIT)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let e = ContextEntry::new(SourceType::Notes, long);
        assert_eq!(e.snippet().chars().count(), CONTEXT_SNIPPET_CHARS);

        let short = ContextEntry::new(SourceType::Email, "lunch at noon");
        assert_eq!(short.snippet(), "lunch at noon");
    }

    #[test]
    fn recent_slice_keeps_most_recent_five() {
        let entries: Vec<ContextEntry> = (0..8)
            .map(|i| ContextEntry::new(SourceType::Manual, format!("entry {i}")))
            .collect();
        let s = recent_slice(&entries);
        assert_eq!(s.len(), 5);
        assert_eq!(s[0].content, "entry 0");
        assert_eq!(s[4].content, "entry 4");
        assert!(recent_slice(&[]).is_empty());
    }

    #[test]
    fn empty_category_renders_as_general() {
        let t = TaskPayload::new("Ship release", "cut v1.2", "  ");
        assert_eq!(t.category_or_default(), "General");
        assert_eq!(TaskPayload::new("a", "", "Work").category_or_default(), "Work");
    }

    #[test]
    fn validate_rejects_blank_title() {
        assert_eq!(
            TaskPayload::new(" ", "x", "Work").validate(),
            Err(PayloadError::EmptyTitle)
        );
        assert!(TaskPayload::new("Ship", "", "").validate().is_ok());
    }

    #[test]
    fn source_type_serializes_lowercase() {
        let e = ContextEntry::new(SourceType::Whatsapp, "hi");
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"content":"hi","source_type":"whatsapp"}"#);
        assert_eq!("EMAIL".parse::<SourceType>(), Ok(SourceType::Email));
    }
}
