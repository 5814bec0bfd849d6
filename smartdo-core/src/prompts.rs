//! Prompt templates. Pure string building, no I/O.
//!
//! The answer format each caller expects is spelled out inside the prompt;
//! nothing enforces it, which is why `crate::parser` always has a default.

use crate::payload::{recent_slice, ContextEntry, TaskPayload};

/// System message sent alongside every prompt.
pub const SYSTEM_PROMPT: &str =
    "You are an AI assistant specialized in task management and productivity.";

/// Bullet list of the most recent context entries, each cut to a snippet.
pub fn context_summary(context: &[ContextEntry]) -> String {
    let recent = recent_slice(context);
    if recent.is_empty() {
        return "- (no recent context)".to_string();
    }
    recent
        .iter()
        .map(|c| format!("- {}...", c.snippet()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_priority_prompt(task: &TaskPayload, context: &[ContextEntry]) -> String {
    format!(
        "Analyze the priority of this task based on the context provided.\n\
\n\
Task: {title}\n\
Description: {description}\n\
Category: {category}\n\
\n\
Recent Context:\n\
{summary}\n\
\n\
Return a JSON response with:\n\
- priority_score (0-10 float)\n\
- priority_level (1-4 integer: 1=Low, 2=Medium, 3=High, 4=Critical)\n\
- reasoning (brief explanation)\n\
\n\
Format: {{\"priority_score\": 7.5, \"priority_level\": 3, \"reasoning\": \"High priority due to...\"}}\n",
        title = task.title,
        description = task.description,
        category = task.category_or_default(),
        summary = context_summary(context),
    )
}

pub fn build_deadline_prompt(task: &TaskPayload, workload: u32) -> String {
    format!(
        "Suggest a realistic deadline for this task based on its complexity and current workload.\n\
\n\
Task: {title}\n\
Description: {description}\n\
Category: {category}\n\
Current Workload: {workload} active tasks\n\
\n\
Consider:\n\
- Task complexity and scope\n\
- Current workload\n\
- Task urgency and importance\n\
- Realistic time estimates\n\
\n\
Return a JSON response with:\n\
- suggested_deadline (ISO format: YYYY-MM-DD HH:MM:SS)\n\
- reasoning (brief explanation)\n\
\n\
Format: {{\"suggested_deadline\": \"2024-01-15 17:00:00\", \"reasoning\": \"Based on task complexity...\"}}\n",
        title = task.title,
        description = task.description,
        category = task.category_or_default(),
    )
}

pub fn build_enhancement_prompt(task: &TaskPayload, context: &[ContextEntry]) -> String {
    format!(
        "Enhance this task description with context-aware details and actionable insights.\n\
\n\
Original Task: {title}\n\
Original Description: {description}\n\
Category: {category}\n\
\n\
Recent Context:\n\
{summary}\n\
\n\
Provide an enhanced description that includes:\n\
- More specific details and requirements\n\
- Context-aware considerations\n\
- Potential challenges or dependencies\n\
- Suggested approach or steps\n\
\n\
Return only the enhanced description text, no JSON formatting.\n",
        title = task.title,
        description = task.description,
        category = task.category_or_default(),
        summary = context_summary(context),
    )
}

/// Known categories are listed sorted and de-duplicated so the prompt is stable.
pub fn build_category_prompt(
    task: &TaskPayload,
    context: &[ContextEntry],
    known_categories: &[String],
) -> String {
    let mut known: Vec<&str> = known_categories.iter().map(String::as_str).collect();
    known.sort_unstable();
    known.dedup();
    let listed = known
        .iter()
        .map(|c| format!("\"{}\"", c.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Given the following task:\n\
Title: {title}\n\
Description: {description}\n\
Category: {category}\n\
\n\
Recent Context:\n\
{summary}\n\
\n\
Choose the most appropriate categories/tags from this list: [{listed}]\n\
If none fit, suggest new tags. Return a JSON list of tag names.\n\
\n\
Format: [\"Work\", \"Release\"]\n",
        title = task.title,
        description = task.description,
        category = task.category_or_default(),
        summary = context_summary(context),
    )
}
