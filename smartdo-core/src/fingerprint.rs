//! Cache fingerprints: SHA-256 over an operation name and canonical JSON of
//! its arguments.
//!
//! Canonical JSON sorts object keys recursively, so two payloads that differ
//! only in key order hash the same. The digest does not depend on process
//! state and stays valid across restarts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// The four cached orchestrator operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Priority,
    Deadline,
    Enhance,
    Categories,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Priority => "priority",
            Operation::Deadline => "deadline",
            Operation::Enhance => "enhance",
            Operation::Categories => "categories",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"<operation>:<hex sha256>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild a JSON value with every object's keys in sorted order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn canonical_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Plain structs, strings, numbers and sequences always serialize.
    let v = serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "fingerprint argument did not serialize");
        Value::Null
    });
    canonicalize(v).to_string()
}

/// Fingerprint an operation over its task payload and remaining arguments.
pub fn fingerprint<T, A>(op: Operation, task: &T, args: &A) -> Fingerprint
where
    T: Serialize + ?Sized,
    A: Serialize + ?Sized,
{
    let mut hasher = Sha256::new();
    hasher.update(op.as_str().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(canonical_json(task).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(canonical_json(args).as_bytes());
    Fingerprint(format!("{}:{}", op.as_str(), hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ContextEntry, SourceType, TaskPayload};

    fn task() -> TaskPayload {
        TaskPayload::new("Ship release", "cut v1.2", "Work")
    }

    #[test]
    fn equal_inputs_share_a_fingerprint() {
        let ctx = vec![ContextEntry::new(SourceType::Email, "release friday")];
        let a = fingerprint(Operation::Priority, &task(), &ctx);
        let b = fingerprint(Operation::Priority, &task(), &ctx.clone());
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("priority:"));
        assert_eq!(a.as_str().len(), "priority:".len() + 64);
    }

    #[test]
    fn any_field_change_changes_fingerprint() {
        let ctx = vec![ContextEntry::new(SourceType::Email, "release friday")];
        let base = fingerprint(Operation::Priority, &task(), &ctx);

        let mut t = task();
        t.title.push('!');
        assert_ne!(base, fingerprint(Operation::Priority, &t, &ctx));

        let mut t = task();
        t.description = "cut v1.3".into();
        assert_ne!(base, fingerprint(Operation::Priority, &t, &ctx));

        let mut t = task();
        t.category = "Home".into();
        assert_ne!(base, fingerprint(Operation::Priority, &t, &ctx));

        let t = task().with_workload(3);
        assert_ne!(base, fingerprint(Operation::Priority, &t, &ctx));

        let other_ctx = vec![ContextEntry::new(SourceType::Notes, "release friday")];
        assert_ne!(base, fingerprint(Operation::Priority, &task(), &other_ctx));

        assert_ne!(base, fingerprint(Operation::Enhance, &task(), &ctx));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(
            r#"{"title":"Ship release","description":"cut v1.2","category":"Work"}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"category":"Work","title":"Ship release","description":"cut v1.2"}"#,
        )
        .unwrap();
        let ctx: Value = serde_json::from_str(r#"[{"source_type":"email","content":"hi"}]"#).unwrap();
        let ctx2: Value = serde_json::from_str(r#"[{"content":"hi","source_type":"email"}]"#).unwrap();

        assert_eq!(
            fingerprint(Operation::Priority, &a, &ctx),
            fingerprint(Operation::Priority, &b, &ctx2)
        );

        // The typed payload hashes the same as its JSON form.
        let typed: TaskPayload = serde_json::from_value(b).unwrap();
        assert_eq!(
            fingerprint(Operation::Priority, &typed, &ctx),
            fingerprint(Operation::Priority, &a, &ctx)
        );
    }

    #[test]
    fn canonicalize_sorts_nested_objects() {
        let v: Value = serde_json::from_str(r#"{"b":{"z":1,"a":2},"a":[{"y":1,"x":2}]}"#).unwrap();
        assert_eq!(canonicalize(v).to_string(), r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }
}
