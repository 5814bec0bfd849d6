//! ResponseParser: free-form model text in, typed values out.
//!
//! Every function here returns a usable value. When the answer cannot be
//! read, the fixed default is substituted and the reason is reported in
//! `Parsed::fallback`. Nothing in this module panics on model output.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::results::{default_tags, FallbackReason, Parsed, PriorityResult};
use crate::time::parse_deadline_str;

/// Days added to `now` when no deadline can be read.
pub const DEFAULT_DEADLINE_DAYS: i64 = 7;

/// Slice from the first `open` to the last `close`, inclusive.
fn structured_span(raw: &str, open: char, close: char) -> Result<&str, FallbackReason> {
    if raw.trim().is_empty() {
        return Err(FallbackReason::EmptyResponse);
    }
    match (raw.find(open), raw.rfind(close)) {
        (Some(start), Some(end)) if end > start => Ok(&raw[start..=end]),
        _ => Err(FallbackReason::NoStructuredData),
    }
}

fn decode(span: &str) -> Result<Value, FallbackReason> {
    serde_json::from_str(span).map_err(|e| FallbackReason::InvalidJson(e.to_string()))
}

fn priority_from(raw: &str) -> Result<PriorityResult, FallbackReason> {
    let v = decode(structured_span(raw, '{', '}')?)?;

    let score = v
        .get("priority_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| FallbackReason::InvalidValue("priority_score missing or not a number".into()))?;
    let level = v
        .get("priority_level")
        .and_then(|l| l.as_i64().or_else(|| l.as_f64().map(|f| f.round() as i64)))
        .ok_or_else(|| FallbackReason::InvalidValue("priority_level missing or not a number".into()))?;
    let reasoning = v
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(PriorityResult {
        priority_score: score.clamp(0.0, 10.0),
        priority_level: level.clamp(1, 4) as u8,
        reasoning,
    })
}

/// Read `{"priority_score", "priority_level", "reasoning"}`.
///
/// Out-of-range numbers are clamped: score to 0..=10, level to 1..=4.
pub fn parse_priority(raw: &str) -> Parsed<PriorityResult> {
    match priority_from(raw) {
        Ok(p) => Parsed::ok(p),
        Err(reason) => Parsed::fallback(PriorityResult::default(), reason),
    }
}

fn deadline_from(raw: &str, tz: Tz) -> Result<DateTime<Utc>, FallbackReason> {
    let v = decode(structured_span(raw, '{', '}')?)?;
    let s = v
        .get("suggested_deadline")
        .and_then(Value::as_str)
        .ok_or_else(|| FallbackReason::InvalidValue("suggested_deadline missing".into()))?;
    parse_deadline_str(s, tz).map_err(|e| FallbackReason::InvalidValue(e.to_string()))
}

/// Read `{"suggested_deadline": ...}`; naive times are local to `tz`.
///
/// Falls back to `now + 7 days`.
pub fn parse_deadline(raw: &str, now: DateTime<Utc>, tz: Tz) -> Parsed<DateTime<Utc>> {
    match deadline_from(raw, tz) {
        Ok(d) => Parsed::ok(d),
        Err(reason) => Parsed::fallback(default_deadline(now), reason),
    }
}

pub fn default_deadline(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(DEFAULT_DEADLINE_DAYS)
}

fn tags_from(raw: &str) -> Result<Vec<String>, FallbackReason> {
    let v = decode(structured_span(raw, '[', ']')?)?;
    let items = v
        .as_array()
        .ok_or_else(|| FallbackReason::InvalidValue("expected a JSON list".into()))?;

    let mut tags: Vec<String> = Vec::new();
    for item in items {
        let Some(s) = item.as_str() else { continue };
        let tag = s.trim();
        if tag.is_empty() || tags.iter().any(|t| t == tag) {
            continue;
        }
        tags.push(tag.to_string());
    }

    if tags.is_empty() {
        return Err(FallbackReason::InvalidValue("no usable tags".into()));
    }
    Ok(tags)
}

/// Read a JSON list of tag names, trimmed and de-duplicated in order.
///
/// Falls back to `["General"]`.
pub fn parse_tags(raw: &str) -> Parsed<Vec<String>> {
    match tags_from(raw) {
        Ok(t) => Parsed::ok(t),
        Err(reason) => Parsed::fallback(default_tags(), reason),
    }
}

/// Plain-text answers are passed through trimmed; empty ones keep `original`.
pub fn parse_text(raw: &str, original: &str) -> Parsed<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Parsed::fallback(original.to_string(), FallbackReason::EmptyResponse);
    }
    Parsed::ok(text.to_string())
}
