//! Presentation of an event log.
//!
//! Rendering is a pure function of the log: the same log always renders to
//! the same text. Handoffs show as a handoff line, including handoffs that
//! were recorded as `transfer_to_*` tool calls, whose results are hidden.

use std::collections::HashSet;

use crate::error::Result;
use crate::items::{Event, EventLog};
use crate::model::HANDOFF_TOOL_PREFIX;

/// Longest tool payload shown before truncation, in characters.
pub const MAX_PAYLOAD_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    ToolError,
    Handoff,
}

/// One rendered line, tied to the log position it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub index: usize,
    pub kind: LineKind,
    pub text: String,
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

/// Renders every visible event in log order.
pub fn render_lines(events: &[Event]) -> Vec<RenderedLine> {
    let mut hidden: HashSet<&str> = HashSet::new();
    let mut lines = Vec::with_capacity(events.len());

    for (index, event) in events.iter().enumerate() {
        let (kind, text) = match event {
            Event::UserMessage { content } => (LineKind::User, format!("[user] {}", content)),
            Event::AssistantMessage { content, agent } => {
                (LineKind::Assistant, format!("[{}] {}", agent, content))
            }
            Event::ToolCall {
                tool_name, call_id, ..
            } if tool_name.starts_with(HANDOFF_TOOL_PREFIX) => {
                hidden.insert(call_id);
                let target = &tool_name[HANDOFF_TOOL_PREFIX.len()..];
                (LineKind::Handoff, format!("[handoff] -> {}", target))
            }
            Event::ToolCall {
                tool_name,
                arguments,
                call_id,
            } => (
                LineKind::ToolCall,
                format!(
                    "[tool] {}({}) #{}",
                    tool_name,
                    truncate(arguments, MAX_PAYLOAD_CHARS),
                    call_id
                ),
            ),
            Event::ToolResult { call_id, .. } if hidden.contains(call_id.as_str()) => continue,
            Event::ToolResult {
                call_id,
                output,
                is_error,
            } => {
                let kind = if *is_error {
                    LineKind::ToolError
                } else {
                    LineKind::ToolResult
                };
                let label = if *is_error { "error" } else { "result" };
                (
                    kind,
                    format!("[{}] #{} {}", label, call_id, truncate(output, MAX_PAYLOAD_CHARS)),
                )
            }
            Event::HandoffCall {
                from_agent,
                to_agent,
            } => (
                LineKind::Handoff,
                format!("[handoff] {} -> {}", from_agent, to_agent),
            ),
        };
        lines.push(RenderedLine { index, kind, text });
    }
    lines
}

/// Renders the whole log, one line per visible event.
pub fn render_log(log: &EventLog) -> String {
    render_lines(log.events())
        .into_iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders events at or after log position `from`.
pub fn render_since(log: &EventLog, from: usize) -> String {
    render_lines(log.events())
        .into_iter()
        .filter(|l| l.index >= from)
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders a JSON log, skipping entries with unknown tags.
pub fn render_json_lenient(data: &str) -> Result<String> {
    let (log, _skipped) = EventLog::from_json_lenient(data)?;
    Ok(render_log(&log))
}
