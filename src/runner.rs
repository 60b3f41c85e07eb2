//! # Runner
//!
//! The `Runner` drives one user turn: it asks the active agent's reasoning
//! capability what to do, routes tool calls through the injected gateway,
//! applies handoffs and records every step in the session's event log.
//!
//! A turn is a linear walk over [`TurnState`]:
//!
//! ```text
//! Reasoning ──▶ ToolExecuting ──▶ Reasoning
//!           ──▶ HandingOff    ──▶ Reasoning (as the new agent)
//!           ──▶ Responding    ──▶ done
//! ```
//!
//! At most one handoff succeeds per turn, so after N turns the active agent
//! is at most N handoff edges from the root. A second handoff request in the
//! same turn ends it with [`AgentsError::HandoffLimitExceeded`].
//!
//! Tool failures never abort a turn; they are recorded as error payloads and
//! the agent reasons over them. An invalid handoff, the iteration guard,
//! cancellation and provider failures end the turn with an error. Events that
//! were already appended stay in the log, and a `ToolCall` is never left
//! without its `ToolResult`.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::AgentDefinition;
use crate::error::{AgentsError, Result};
use crate::gateway::ToolGateway;
use crate::items::{Event, EventLog};
use crate::model::{HandoffSpec, ModelProvider, ReasoningOutcome, ReasoningRequest, ToolRequest};
use crate::registry::AgentRegistry;
use crate::tool::{ToolResult, ToolSpec};

/// Reasoning steps allowed per turn unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Per-runner turn configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum reasoning steps in one turn, handoffs included.
    pub max_iterations: usize,
    cancellation: Option<CancellationToken>,
    event_sink: Option<mpsc::UnboundedSender<Event>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancellation: None,
            event_sink: None,
        }
    }
}

impl RunConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Checked between iterations. An in-flight gateway call is never
    /// interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Every appended event is also sent to `sink`.
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<Event>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Agent that owns the conversation after the turn.
    pub active_agent: String,
    pub final_output: String,
    /// Reasoning steps taken.
    pub iterations: usize,
    /// Log position of the turn's `UserMessage`.
    pub first_new_event: usize,
}

/// Orchestration states of one turn.
#[derive(Debug)]
enum TurnState {
    Reasoning,
    ToolExecuting(Vec<ToolRequest>),
    HandingOff(String),
    Responding(String),
}

/// Drives turns against a frozen registry.
#[derive(Clone)]
pub struct Runner {
    registry: Arc<AgentRegistry>,
    provider: Arc<dyn ModelProvider>,
    gateway: Arc<dyn ToolGateway>,
    config: RunConfig,
}

impl Runner {
    pub fn new(
        registry: Arc<AgentRegistry>,
        provider: Arc<dyn ModelProvider>,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        Self {
            registry,
            provider,
            gateway,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs one turn for `active_agent`, appending to `log`.
    ///
    /// Empty input is rejected before the log is touched.
    pub async fn run(
        &self,
        active_agent: &str,
        log: &mut EventLog,
        user_input: &str,
    ) -> Result<TurnOutcome> {
        if user_input.trim().is_empty() {
            return Err(AgentsError::EmptyInput);
        }
        let agent = self
            .registry
            .get(active_agent)
            .ok_or_else(|| AgentsError::UnknownAgent {
                name: active_agent.to_string(),
            })?;

        let span = info_span!("turn", agent = %agent.name);
        self.run_turn(agent, log, user_input).instrument(span).await
    }

    async fn run_turn<'a>(
        &'a self,
        mut agent: &'a AgentDefinition,
        log: &mut EventLog,
        user_input: &str,
    ) -> Result<TurnOutcome> {
        info!(agent = %agent.name, "Starting turn");
        let first_new_event = log.len();
        self.record(log, Event::user(user_input));

        let mut iterations = 0;
        let mut handed_off = false;
        let mut state = TurnState::Reasoning;

        loop {
            state = match state {
                TurnState::Reasoning => {
                    if self.config.is_cancelled() {
                        warn!(iteration = iterations, "Turn cancelled");
                        return Err(AgentsError::Cancelled { iterations });
                    }
                    if iterations >= self.config.max_iterations {
                        warn!(
                            max_iterations = self.config.max_iterations,
                            "Iteration guard reached"
                        );
                        return Err(AgentsError::MaxIterationsExceeded {
                            max_iterations: self.config.max_iterations,
                        });
                    }
                    iterations += 1;
                    debug!(iteration = iterations, agent = %agent.name, "Reasoning");
                    self.reason(agent, log).await?
                }
                TurnState::ToolExecuting(requests) => {
                    self.dispatch_tools(agent, log, requests).await;
                    TurnState::Reasoning
                }
                TurnState::HandingOff(target) => {
                    if handed_off {
                        warn!(from = %agent.name, to = %target, "Second handoff in one turn");
                        return Err(AgentsError::HandoffLimitExceeded {
                            from: agent.name.clone(),
                            to: target,
                        });
                    }
                    let next = self.registry.resolve_handoff(&agent.name, &target)?;
                    info!(from = %agent.name, to = %next.name, "Handoff");
                    self.record(log, Event::handoff(&agent.name, &next.name));
                    agent = next;
                    handed_off = true;
                    TurnState::Reasoning
                }
                TurnState::Responding(text) => {
                    self.record(log, Event::assistant(&text, &agent.name));
                    info!(agent = %agent.name, iterations, "Turn complete");
                    return Ok(TurnOutcome {
                        active_agent: agent.name.clone(),
                        final_output: text,
                        iterations,
                        first_new_event,
                    });
                }
            };
        }
    }

    async fn reason(&self, agent: &AgentDefinition, log: &EventLog) -> Result<TurnState> {
        let tools = self.tool_specs_for(agent);
        let handoffs: Vec<HandoffSpec> = agent
            .handoffs()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .map(HandoffSpec::for_agent)
            .collect();

        let outcome = self
            .provider
            .reason(ReasoningRequest {
                agent,
                tools: &tools,
                handoffs: &handoffs,
                events: log.events(),
            })
            .await?;

        match outcome {
            ReasoningOutcome::FinalMessage(text) => Ok(TurnState::Responding(text)),
            ReasoningOutcome::ToolRequests(requests) if requests.is_empty() => {
                Err(AgentsError::ModelBehaviorError {
                    message: "empty tool request batch".to_string(),
                })
            }
            ReasoningOutcome::ToolRequests(requests) => Ok(TurnState::ToolExecuting(requests)),
            ReasoningOutcome::HandoffRequest { target } => Ok(TurnState::HandingOff(target)),
        }
    }

    /// Tools bound to `agent` that the gateway offers.
    fn tool_specs_for(&self, agent: &AgentDefinition) -> Vec<ToolSpec> {
        self.gateway
            .specs()
            .into_iter()
            .filter(|spec| agent.has_tool(&spec.name))
            .collect()
    }

    /// Records and executes one batch. Sequential agents see
    /// call/result/call/result; parallel agents record every call first and
    /// each result as it completes.
    async fn dispatch_tools(
        &self,
        agent: &AgentDefinition,
        log: &mut EventLog,
        requests: Vec<ToolRequest>,
    ) {
        if !agent.model_settings.parallel_tool_calls || requests.len() == 1 {
            for request in requests {
                let call_id = self.record_call(log, &request);
                let result = self.invoke_bound(agent, &request).await;
                self.record_result(log, call_id, &result);
            }
            return;
        }

        let calls: Vec<(String, ToolRequest)> = requests
            .into_iter()
            .map(|request| (self.record_call(log, &request), request))
            .collect();

        let mut in_flight: FuturesUnordered<_> = calls
            .into_iter()
            .map(|(call_id, request)| async move {
                let result = self.invoke_bound(agent, &request).await;
                (call_id, result)
            })
            .collect();

        while let Some((call_id, result)) = in_flight.next().await {
            self.record_result(log, call_id, &result);
        }
    }

    async fn invoke_bound(&self, agent: &AgentDefinition, request: &ToolRequest) -> ToolResult {
        if !agent.has_tool(&request.tool_name) {
            warn!(agent = %agent.name, tool = %request.tool_name, "Tool not bound to agent");
            return ToolResult::error(format!(
                "tool '{}' is not available to agent '{}'",
                request.tool_name, agent.name
            ));
        }
        self.gateway
            .invoke(&request.tool_name, &request.arguments)
            .await
    }

    fn record_call(&self, log: &mut EventLog, request: &ToolRequest) -> String {
        let mut call_id = new_call_id();
        while log.contains_call_id(&call_id) {
            call_id = new_call_id();
        }
        debug!(tool = %request.tool_name, call_id = %call_id, "Tool call");
        self.record(
            log,
            Event::tool_call(&request.tool_name, &request.arguments, &call_id),
        );
        call_id
    }

    fn record_result(&self, log: &mut EventLog, call_id: String, result: &ToolResult) {
        debug!(call_id = %call_id, is_error = result.is_error(), "Tool result");
        self.record(
            log,
            Event::tool_result(call_id, &result.payload(), result.is_error()),
        );
    }

    fn record(&self, log: &mut EventLog, event: Event) {
        if let Some(sink) = &self.config.event_sink {
            // A closed receiver only stops live rendering.
            let _ = sink.send(event.clone());
        }
        log.append(event);
    }
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ToolRouter;
    use crate::model::ScriptedReasoner;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn gateway() -> Arc<ToolRouter> {
        Arc::new(
            ToolRouter::builder()
                .tool(Arc::new(FunctionTool::new(
                    "lookup",
                    "Lookup",
                    json!({}),
                    |args| Ok(json!({"echo": args})),
                )))
                .tool(Arc::new(FunctionTool::from_async(
                    "slow",
                    "Slow",
                    json!({}),
                    |_| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(json!("slow"))
                    },
                )))
                .build(),
        )
    }

    fn registry(gateway: &ToolRouter, parallel: bool) -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        registry
            .define(
                AgentDefinition::new("Triage", "Route")
                    .with_handoff("Worker")
                    .with_parallel_tool_calls(parallel),
            )
            .unwrap();
        registry
            .define(AgentDefinition::new("Worker", "Work").with_parallel_tool_calls(parallel))
            .unwrap();
        registry
            .attach_tools("Worker", gateway, &["lookup", "slow"])
            .unwrap();
        registry.into_shared().unwrap()
    }

    fn runner(reasoner: ScriptedReasoner, parallel: bool) -> Runner {
        let gateway = gateway();
        Runner::new(registry(&gateway, parallel), Arc::new(reasoner), gateway)
    }

    #[tokio::test]
    async fn test_empty_input_leaves_log_untouched() {
        let runner = runner(ScriptedReasoner::new(), false);
        let mut log = EventLog::new();
        for input in ["", "   \n\t"] {
            let err = runner.run("Triage", &mut log, input).await.unwrap_err();
            assert!(matches!(err, AgentsError::EmptyInput));
        }
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_active_agent() {
        let runner = runner(ScriptedReasoner::new(), false);
        let mut log = EventLog::new();
        let err = runner.run("Ghost", &mut log, "hi").await.unwrap_err();
        assert!(matches!(err, AgentsError::UnknownAgent { .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_simple_final_message() {
        let runner = runner(ScriptedReasoner::new().with_message("Hello!"), false);
        let mut log = EventLog::new();
        let outcome = runner.run("Triage", &mut log, "hi").await.unwrap();
        assert_eq!(outcome.active_agent, "Triage");
        assert_eq!(outcome.final_output, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.first_new_event, 0);
        assert_eq!(
            log.events(),
            &[Event::user("hi"), Event::assistant("Hello!", "Triage")]
        );
    }

    #[tokio::test]
    async fn test_handoff_then_tool_then_answer() {
        let reasoner = ScriptedReasoner::new()
            .with_handoff("Worker")
            .with_tool_call("lookup", json!({"id": 7}))
            .with_message("Found it");
        let runner = runner(reasoner, false);
        let mut log = EventLog::new();
        let outcome = runner.run("Triage", &mut log, "find 7").await.unwrap();

        assert_eq!(outcome.active_agent, "Worker");
        assert_eq!(outcome.iterations, 3);
        assert_eq!(log.len(), 5);
        assert_eq!(log.events()[1], Event::handoff("Triage", "Worker"));
        assert!(matches!(&log.events()[2], Event::ToolCall { tool_name, .. } if tool_name == "lookup"));
        assert!(log.is_complete());
    }

    #[tokio::test]
    async fn test_handoff_advertised_only_for_targets() {
        let reasoner = Arc::new(ScriptedReasoner::new().with_handoff("Worker"));
        let gateway = gateway();
        let runner = Runner::new(registry(&gateway, false), reasoner.clone(), gateway);
        let mut log = EventLog::new();
        runner.run("Triage", &mut log, "hi").await.unwrap();

        let observed = reasoner.observed();
        assert_eq!(observed[0].agent, "Triage");
        assert_eq!(observed[0].handoffs, vec!["Worker".to_string()]);
        assert!(observed[0].tools.is_empty());
        assert_eq!(observed[1].agent, "Worker");
        assert_eq!(observed[1].tools, vec!["lookup".to_string(), "slow".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_handoff_is_fatal() {
        let runner = runner(ScriptedReasoner::new().with_handoff("Triage"), false);
        let mut log = EventLog::new();
        let err = runner.run("Worker", &mut log, "hi").await.unwrap_err();
        assert!(matches!(err, AgentsError::InvalidHandoff { ref from, ref to } if from == "Worker" && to == "Triage"));
        assert_eq!(log.events(), &[Event::user("hi")]);
    }

    #[tokio::test]
    async fn test_second_handoff_in_turn_is_rejected() {
        let reasoner = ScriptedReasoner::new()
            .with_handoff("Worker")
            .with_handoff("Triage")
            .with_message("never");
        let runner = runner(reasoner, false);
        let mut log = EventLog::new();
        let err = runner.run("Triage", &mut log, "hi").await.unwrap_err();
        assert!(matches!(
            err,
            AgentsError::HandoffLimitExceeded { ref from, ref to }
                if from == "Worker" && to == "Triage"
        ));
        assert_eq!(
            log.events(),
            &[Event::user("hi"), Event::handoff("Triage", "Worker")]
        );
    }

    #[tokio::test]
    async fn test_unbound_tool_is_error_payload() {
        let reasoner = ScriptedReasoner::new()
            .with_tool_call("lookup", json!({}))
            .with_message("Sorry");
        let runner = runner(reasoner, false);
        let mut log = EventLog::new();
        let outcome = runner.run("Triage", &mut log, "hi").await.unwrap();
        assert_eq!(outcome.final_output, "Sorry");
        match &log.events()[2] {
            Event::ToolResult {
                output, is_error, ..
            } => {
                assert!(*is_error);
                assert!(output.contains("not available to agent 'Triage'"));
            }
            other => panic!("expected ToolResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_max_iterations_keeps_log() {
        let mut reasoner = ScriptedReasoner::new();
        for _ in 0..5 {
            reasoner = reasoner.with_tool_call("lookup", json!({}));
        }
        let runner = runner(reasoner, false).with_config(RunConfig::default().with_max_iterations(3));
        let mut log = EventLog::new();
        let err = runner.run("Worker", &mut log, "loop").await.unwrap_err();
        assert!(matches!(err, AgentsError::MaxIterationsExceeded { max_iterations: 3 }));
        // user + 3 call/result pairs
        assert_eq!(log.len(), 7);
        assert!(log.is_complete());
    }

    #[tokio::test]
    async fn test_parallel_results_in_completion_order() {
        let reasoner = ScriptedReasoner::new()
            .with_outcome(ReasoningOutcome::ToolRequests(vec![
                ToolRequest::new("slow", json!({})),
                ToolRequest::new("lookup", json!({"q": 1})),
            ]))
            .with_message("done");
        let runner = runner(reasoner, true);
        let mut log = EventLog::new();
        runner.run("Worker", &mut log, "go").await.unwrap();

        let tags: Vec<&str> = log.iter().map(|e| e.tag()).collect();
        assert_eq!(
            tags,
            vec!["UserMessage", "ToolCall", "ToolCall", "ToolResult", "ToolResult", "AssistantMessage"]
        );
        let call_ids: Vec<String> = log
            .iter()
            .filter_map(|e| match e {
                Event::ToolCall { call_id, .. } => Some(call_id.clone()),
                _ => None,
            })
            .collect();
        // lookup finishes first
        assert!(matches!(&log.events()[3], Event::ToolResult { call_id, .. } if *call_id == call_ids[1]));
        assert!(matches!(&log.events()[4], Event::ToolResult { call_id, .. } if *call_id == call_ids[0]));
    }

    #[tokio::test]
    async fn test_cancelled_before_reasoning() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = runner(ScriptedReasoner::new().with_message("never"), false)
            .with_config(RunConfig::default().with_cancellation(token));
        let mut log = EventLog::new();
        let err = runner.run("Triage", &mut log, "hi").await.unwrap_err();
        assert!(matches!(err, AgentsError::Cancelled { iterations: 0 }));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_event_sink_sees_every_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reasoner = ScriptedReasoner::new()
            .with_handoff("Worker")
            .with_message("ok");
        let runner = runner(reasoner, false).with_config(RunConfig::default().with_event_sink(tx));
        let mut log = EventLog::new();
        runner.run("Triage", &mut log, "hi").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, log.events().to_vec());
    }

    #[tokio::test]
    async fn test_empty_batch_is_model_error() {
        let runner = runner(
            ScriptedReasoner::new().with_outcome(ReasoningOutcome::ToolRequests(vec![])),
            false,
        );
        let mut log = EventLog::new();
        let err = runner.run("Worker", &mut log, "hi").await.unwrap_err();
        assert!(matches!(err, AgentsError::ModelBehaviorError { .. }));
    }
}
