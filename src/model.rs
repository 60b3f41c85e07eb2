//! Reasoning capability
//!
//! The runner asks a [`ModelProvider`] what the active agent does next. The
//! answer is a [`ReasoningOutcome`]: a final message, a batch of tool
//! requests, or a handoff. [`OpenAIProvider`] implements this over
//! async-openai chat completions; [`ScriptedReasoner`] and [`ReasonerFn`] are
//! deterministic stand-ins for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
        FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::{AgentDefinition, ToolChoice};
use crate::error::{AgentsError, Result};
use crate::items::Event;
use crate::tool::ToolSpec;

/// Prefix of the function name under which handoffs are advertised.
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// Function name advertised for a handoff to `agent_name`.
pub fn handoff_tool_name(agent_name: &str) -> String {
    let suffix: String = agent_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}", HANDOFF_TOOL_PREFIX, suffix)
}

/// A handoff target as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSpec {
    pub agent_name: String,
    pub tool_name: String,
    pub description: Option<String>,
}

impl HandoffSpec {
    pub fn for_agent(agent: &AgentDefinition) -> Self {
        Self {
            agent_name: agent.name.clone(),
            tool_name: handoff_tool_name(&agent.name),
            description: agent.handoff_description.clone(),
        }
    }
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// What the active agent decided to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningOutcome {
    FinalMessage(String),
    ToolRequests(Vec<ToolRequest>),
    HandoffRequest { target: String },
}

impl ReasoningOutcome {
    pub fn message(text: impl Into<String>) -> Self {
        ReasoningOutcome::FinalMessage(text.into())
    }

    pub fn tool(tool_name: impl Into<String>, arguments: Value) -> Self {
        ReasoningOutcome::ToolRequests(vec![ToolRequest::new(tool_name, arguments)])
    }

    pub fn handoff(target: impl Into<String>) -> Self {
        ReasoningOutcome::HandoffRequest {
            target: target.into(),
        }
    }
}

/// Everything the reasoning step sees.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub agent: &'a AgentDefinition,
    /// Tools bound to the agent that the gateway can execute.
    pub tools: &'a [ToolSpec],
    pub handoffs: &'a [HandoffSpec],
    /// The event log so far.
    pub events: &'a [Event],
}

/// Trait for reasoning providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn reason(&self, request: ReasoningRequest<'_>) -> Result<ReasoningOutcome>;
}

/// System prompt: the agent's instructions plus its handoff targets.
pub fn system_prompt(agent: &AgentDefinition, handoffs: &[HandoffSpec]) -> String {
    let mut content = agent.instructions.clone();
    if !handoffs.is_empty() {
        content.push_str("\n\nYou can hand off to the following agents:\n");
        for h in handoffs {
            match &h.description {
                Some(d) => content.push_str(&format!("- {} ({}): {}\n", h.agent_name, h.tool_name, d)),
                None => content.push_str(&format!("- {} ({})\n", h.agent_name, h.tool_name)),
            }
        }
    }
    content
}

/// OpenAI chat-completions provider
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIProvider {
    /// Uses `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    /// Converts the event log into chat messages. Consecutive tool calls
    /// share one assistant message; handoffs replay as a `transfer_to_*` call
    /// plus its acknowledgement.
    fn convert_events(&self, events: &[Event]) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(events.len());
        let mut pending: Vec<ChatCompletionMessageToolCall> = Vec::new();

        for (idx, event) in events.iter().enumerate() {
            if let Event::ToolCall {
                tool_name,
                arguments,
                call_id,
            } = event
            {
                pending.push(function_call(call_id, tool_name, arguments));
                continue;
            }
            flush_tool_calls(&mut messages, &mut pending)?;

            match event {
                Event::UserMessage { content } => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content.clone())
                        .build()?
                        .into(),
                ),
                Event::AssistantMessage { content, .. } => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content.clone())
                        .build()?
                        .into(),
                ),
                Event::ToolResult {
                    call_id, output, ..
                } => messages.push(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(output.clone())
                        .tool_call_id(call_id.clone())
                        .build()?
                        .into(),
                ),
                Event::HandoffCall { to_agent, .. } => {
                    let call_id = format!("handoff_{}", idx);
                    messages.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(vec![function_call(
                                &call_id,
                                &handoff_tool_name(to_agent),
                                "{}",
                            )])
                            .build()?
                            .into(),
                    );
                    messages.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .content(json!({ "assistant": to_agent }).to_string())
                            .tool_call_id(call_id)
                            .build()?
                            .into(),
                    );
                }
                Event::ToolCall { .. } => {}
            }
        }
        flush_tool_calls(&mut messages, &mut pending)?;
        Ok(messages)
    }

    fn convert_tools(
        &self,
        tools: &[ToolSpec],
        handoffs: &[HandoffSpec],
    ) -> Result<Vec<ChatCompletionTool>> {
        let mut out = Vec::with_capacity(tools.len() + handoffs.len());
        for tool in tools {
            out.push(function_tool(
                &tool.name,
                &tool.description,
                tool.parameters.clone(),
            )?);
        }
        for h in handoffs {
            let description = h
                .description
                .clone()
                .unwrap_or_else(|| format!("Hand off to the {} agent", h.agent_name));
            out.push(function_tool(
                &h.tool_name,
                &description,
                json!({"type": "object", "properties": {}, "additionalProperties": false}),
            )?);
        }
        Ok(out)
    }
}

fn function_call(call_id: &str, name: &str, arguments: &str) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: call_id.to_string(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

fn function_tool(name: &str, description: &str, parameters: Value) -> Result<ChatCompletionTool> {
    Ok(ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name(name)
                .description(description)
                .parameters(parameters)
                .build()?,
        )
        .build()?)
}

fn flush_tool_calls(
    messages: &mut Vec<ChatCompletionRequestMessage>,
    pending: &mut Vec<ChatCompletionMessageToolCall>,
) -> Result<()> {
    if !pending.is_empty() {
        messages.push(
            ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(std::mem::take(pending))
                .build()?
                .into(),
        );
    }
    Ok(())
}

/// Maps the model's function calls to an outcome. A call following the
/// handoff naming pattern wins over ordinary tool calls in the same batch.
fn outcome_from_calls(
    calls: &[ChatCompletionMessageToolCall],
    handoffs: &[HandoffSpec],
) -> ReasoningOutcome {
    for call in calls {
        if let Some(h) = handoffs.iter().find(|h| h.tool_name == call.function.name) {
            return ReasoningOutcome::handoff(h.agent_name.clone());
        }
        if let Some(target) = call.function.name.strip_prefix(HANDOFF_TOOL_PREFIX) {
            return ReasoningOutcome::handoff(target);
        }
    }
    ReasoningOutcome::ToolRequests(
        calls
            .iter()
            .map(|c| {
                let arguments = serde_json::from_str(&c.function.arguments)
                    .unwrap_or_else(|_| Value::String(c.function.arguments.clone()));
                ToolRequest::new(c.function.name.clone(), arguments)
            })
            .collect(),
    )
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn reason(&self, request: ReasoningRequest<'_>) -> Result<ReasoningOutcome> {
        let agent = request.agent;
        let mut messages: Vec<ChatCompletionRequestMessage> =
            vec![ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt(agent, request.handoffs))
                .build()?
                .into()];
        messages.extend(self.convert_events(request.events)?);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&agent.model).messages(messages);

        let tools = self.convert_tools(request.tools, request.handoffs)?;
        if !tools.is_empty() {
            let settings = &agent.model_settings;
            builder
                .tools(tools)
                .tool_choice(match settings.tool_choice {
                    ToolChoice::Auto => ChatCompletionToolChoiceOption::Auto,
                    ToolChoice::None => ChatCompletionToolChoiceOption::None,
                    ToolChoice::Required => ChatCompletionToolChoiceOption::Required,
                })
                .parallel_tool_calls(settings.parallel_tool_calls);
        }
        if let Some(temperature) = agent.model_settings.temperature {
            builder.temperature(temperature);
        }

        debug!(agent = %agent.name, model = %agent.model, "Requesting completion");
        let response = self.client.chat().create(builder.build()?).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AgentsError::ModelBehaviorError {
                message: "No choices in response".to_string(),
            })?;

        match &choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => Ok(outcome_from_calls(calls, request.handoffs)),
            _ => match &choice.message.content {
                Some(content) if !content.is_empty() => {
                    Ok(ReasoningOutcome::FinalMessage(content.clone()))
                }
                _ => Err(AgentsError::ModelBehaviorError {
                    message: "Empty response without tool calls".to_string(),
                }),
            },
        }
    }
}

/// What a scripted reasoner was asked, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRequest {
    pub agent: String,
    pub tools: Vec<String>,
    pub handoffs: Vec<String>,
    pub events: Vec<Event>,
}

/// Replays queued outcomes in order; falls back to a fixed message when the
/// queue runs dry.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    outcomes: Mutex<VecDeque<ReasoningOutcome>>,
    observed: Mutex<Vec<ObservedRequest>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(self, outcome: ReasoningOutcome) -> Self {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
        self
    }

    pub fn with_message(self, text: impl Into<String>) -> Self {
        self.with_outcome(ReasoningOutcome::message(text))
    }

    pub fn with_tool_call(self, tool_name: impl Into<String>, arguments: Value) -> Self {
        self.with_outcome(ReasoningOutcome::tool(tool_name, arguments))
    }

    pub fn with_handoff(self, target: impl Into<String>) -> Self {
        self.with_outcome(ReasoningOutcome::handoff(target))
    }

    /// Requests seen so far, oldest first.
    pub fn observed(&self) -> Vec<ObservedRequest> {
        self.observed.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.outcomes.lock().map(|q| q.len()).unwrap_or_default()
    }
}

fn observe(request: &ReasoningRequest<'_>) -> ObservedRequest {
    ObservedRequest {
        agent: request.agent.name.clone(),
        tools: request.tools.iter().map(|t| t.name.clone()).collect(),
        handoffs: request.handoffs.iter().map(|h| h.agent_name.clone()).collect(),
        events: request.events.to_vec(),
    }
}

#[async_trait]
impl ModelProvider for ScriptedReasoner {
    async fn reason(&self, request: ReasoningRequest<'_>) -> Result<ReasoningOutcome> {
        if let Ok(mut observed) = self.observed.lock() {
            observed.push(observe(&request));
        }
        let next = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        Ok(next.unwrap_or_else(|| ReasoningOutcome::message("Default response")))
    }
}

type DecideFn = dyn Fn(&ReasoningRequest<'_>) -> Result<ReasoningOutcome> + Send + Sync;

/// Decides with a plain function of the request.
#[derive(Clone)]
pub struct ReasonerFn {
    decide: Arc<DecideFn>,
}

impl ReasonerFn {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&ReasoningRequest<'_>) -> Result<ReasoningOutcome> + Send + Sync + 'static,
    {
        Self {
            decide: Arc::new(decide),
        }
    }
}

#[async_trait]
impl ModelProvider for ReasonerFn {
    async fn reason(&self, request: ReasoningRequest<'_>) -> Result<ReasoningOutcome> {
        (self.decide)(&request)
    }
}
