//! Conversation events and the append-only event log
//!
//! Every observable step of a session (user turns, assistant turns, tool
//! calls, tool results and handoffs) is recorded as an [`Event`] in an
//! [`EventLog`]. Insertion order is conversation order: the log is never
//! reordered or deduplicated, and replaying it reconstructs the conversation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{AgentsError, Result};

/// Serde tags of every event kind this crate understands.
pub const EVENT_TAGS: [&str; 5] = [
    "UserMessage",
    "AssistantMessage",
    "ToolCall",
    "ToolResult",
    "HandoffCall",
];

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
        /// Agent that produced the message.
        agent: String,
    },
    ToolCall {
        tool_name: String,
        /// Arguments serialized as a JSON document.
        arguments: String,
        call_id: String,
    },
    ToolResult {
        call_id: String,
        /// Output serialized as a JSON document; error payloads included.
        output: String,
        #[serde(default)]
        is_error: bool,
    },
    HandoffCall {
        from_agent: String,
        to_agent: String,
    },
}

impl Event {
    pub fn user(content: impl Into<String>) -> Self {
        Event::UserMessage {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, agent: impl Into<String>) -> Self {
        Event::AssistantMessage {
            content: content.into(),
            agent: agent.into(),
        }
    }

    pub fn tool_call(
        tool_name: impl Into<String>,
        arguments: &Value,
        call_id: impl Into<String>,
    ) -> Self {
        Event::ToolCall {
            tool_name: tool_name.into(),
            arguments: arguments.to_string(),
            call_id: call_id.into(),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, output: &Value, is_error: bool) -> Self {
        Event::ToolResult {
            call_id: call_id.into(),
            output: output.to_string(),
            is_error,
        }
    }

    pub fn handoff(from_agent: impl Into<String>, to_agent: impl Into<String>) -> Self {
        Event::HandoffCall {
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
        }
    }

    /// The serde tag of this event.
    pub fn tag(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "UserMessage",
            Event::AssistantMessage { .. } => "AssistantMessage",
            Event::ToolCall { .. } => "ToolCall",
            Event::ToolResult { .. } => "ToolResult",
            Event::HandoffCall { .. } => "HandoffCall",
        }
    }
}

/// Ordered, append-only record of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Events appended at or after position `index`.
    pub fn since(&self, index: usize) -> &[Event] {
        &self.events[index.min(self.events.len())..]
    }

    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Whether `call_id` has already been used by a `ToolCall` in this log.
    pub fn contains_call_id(&self, call_id: &str) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, Event::ToolCall { call_id: id, .. } if id == call_id))
    }

    /// Call ids of `ToolCall`s that do not have a `ToolResult` yet, in order.
    pub fn pending_call_ids(&self) -> Vec<&str> {
        let answered: HashSet<&str> = self
            .events
            .iter()
            .filter_map(|e| match e {
                Event::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::ToolCall { call_id, .. } if !answered.contains(call_id.as_str()) => {
                    Some(call_id.as_str())
                }
                _ => None,
            })
            .collect()
    }

    /// Handoff edges in the order they happened.
    pub fn handoffs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.events.iter().filter_map(|e| match e {
            Event::HandoffCall {
                from_agent,
                to_agent,
            } => Some((from_agent.as_str(), to_agent.as_str())),
            _ => None,
        })
    }

    /// Checks the pairing invariant: call ids are unique and every
    /// `ToolResult` answers exactly one earlier `ToolCall`.
    pub fn validate(&self) -> Result<()> {
        let mut issued: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();

        for (idx, event) in self.events.iter().enumerate() {
            match event {
                Event::ToolCall { call_id, .. } => {
                    if !issued.insert(call_id) {
                        return Err(AgentsError::InvalidEventLog {
                            message: format!("call id '{}' reused at position {}", call_id, idx),
                        });
                    }
                }
                Event::ToolResult { call_id, .. } => {
                    if !issued.contains(call_id.as_str()) {
                        return Err(AgentsError::InvalidEventLog {
                            message: format!(
                                "result for unknown call id '{}' at position {}",
                                call_id, idx
                            ),
                        });
                    }
                    if !answered.insert(call_id) {
                        return Err(AgentsError::InvalidEventLog {
                            message: format!(
                                "duplicate result for call id '{}' at position {}",
                                call_id, idx
                            ),
                        });
                    }
                }
                Event::UserMessage { .. }
                | Event::AssistantMessage { .. }
                | Event::HandoffCall { .. } => {}
            }
        }
        Ok(())
    }

    /// A valid log with no unanswered tool calls.
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok() && self.pending_call_ids().is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Strict load: every entry must be a known event and the result must
    /// satisfy [`EventLog::validate`].
    pub fn from_json(data: &str) -> Result<Self> {
        let log: EventLog = serde_json::from_str(data)?;
        log.validate()?;
        Ok(log)
    }

    /// Lenient load for presentation: entries with an unknown `type` tag are
    /// skipped. Returns the log and the number of skipped entries.
    pub fn from_json_lenient(data: &str) -> Result<(Self, usize)> {
        let raw: Vec<Value> = serde_json::from_str(data)?;
        let mut log = EventLog::new();
        let mut skipped = 0;
        for value in raw {
            let tag = value.get("type").and_then(Value::as_str).unwrap_or("");
            if !EVENT_TAGS.contains(&tag) {
                warn!(tag = %tag, "Skipping unknown event");
                skipped += 1;
                continue;
            }
            log.append(serde_json::from_value(value)?);
        }
        Ok((log, skipped))
    }
}

impl From<Vec<Event>> for EventLog {
    fn from(events: Vec<Event>) -> Self {
        Self { events }
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
