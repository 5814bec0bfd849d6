//! Task and category records as the external store keeps them.
//!
//! The analysis core never persists these itself; it reads them through
//! `crate::store` and, for auto-apply, writes one back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::{TaskPayload, DEFAULT_CATEGORY};

pub type TaskId = u64;
pub type CategoryId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Category name; `None` renders as "General".
    #[serde(default)]
    pub category: Option<String>,

    /// 0-10, written by auto-apply.
    #[serde(default)]
    pub priority_score: f64,
    /// 1=Low .. 4=Critical.
    pub priority: u8,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub status: TaskStatus,

    #[serde(default)]
    pub ai_enhanced_description: String,
    #[serde(default)]
    pub context_tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: None,
            priority_score: 0.0,
            priority: 2,
            deadline: None,
            status: TaskStatus::Pending,
            ai_enhanced_description: String::new(),
            context_tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The fields the models see.
    pub fn to_payload(&self) -> TaskPayload {
        TaskPayload::new(
            self.title.clone(),
            self.description.clone(),
            self.category.clone().unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        )
    }

    pub fn is_open(&self) -> bool {
        self.status != TaskStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub usage_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_defaults_category_to_general() {
        let t = TaskRecord::new(1, "Ship release").with_description("cut v1.2");
        let p = t.to_payload();
        assert_eq!(p.category, "General");
        assert_eq!(p.description, "cut v1.2");
        assert_eq!(p.current_workload, None);

        let t = t.with_category("Work");
        assert_eq!(t.to_payload().category, "Work");
    }

    #[test]
    fn status_round_trips_snake_case() {
        let t = TaskRecord::new(2, "x").with_status(TaskStatus::InProgress);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["status"], "in_progress");
        assert_eq!("completed".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!(t.is_open());
    }
}
