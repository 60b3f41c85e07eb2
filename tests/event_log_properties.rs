//! Property tests over scripted multi-turn sessions.

use std::sync::Arc;

use agent_relay::items::Event;
use agent_relay::model::{ReasonerFn, ReasoningOutcome, ToolRequest};
use agent_relay::render::render_log;
use agent_relay::{
    AgentDefinition, AgentRegistry, AgentsError, EventLog, FunctionTool, Runner, Session,
    ToolRouter,
};
use proptest::prelude::*;
use serde_json::json;

/// A linear chain, so each handoff moves one step further from the root.
const CHAIN: [&str; 4] = ["Reception", "Sales", "Finance", "Delivery"];

#[derive(Debug, Clone)]
struct TurnPlan {
    /// Handoffs the reasoner asks for in this turn, in a row.
    handoffs: usize,
    tool_calls: usize,
}

fn turn_plan() -> impl Strategy<Value = TurnPlan> {
    (0usize..3, 0usize..4).prop_map(|(handoffs, tool_calls)| TurnPlan {
        handoffs,
        tool_calls,
    })
}

/// Reasons from the log alone: the turn index is the number of user messages,
/// and progress within the turn is read from the events after the last one.
fn chain_reasoner(plans: Vec<TurnPlan>) -> ReasonerFn {
    ReasonerFn::new(move |request| {
        let start = request
            .events
            .iter()
            .rposition(|e| matches!(e, Event::UserMessage { .. }))
            .unwrap_or(0);
        let turn = request
            .events
            .iter()
            .filter(|e| matches!(e, Event::UserMessage { .. }))
            .count()
            - 1;
        let plan = &plans[turn];
        let this_turn = &request.events[start..];
        let handoffs_done = this_turn
            .iter()
            .filter(|e| matches!(e, Event::HandoffCall { .. }))
            .count();
        let tools_done = this_turn
            .iter()
            .any(|e| matches!(e, Event::ToolCall { .. }));

        if handoffs_done < plan.handoffs {
            if let Some(next) = request.handoffs.first() {
                return Ok(ReasoningOutcome::handoff(next.agent_name.clone()));
            }
        }
        if plan.tool_calls > 0 && !tools_done {
            let requests = (0..plan.tool_calls)
                .map(|i| ToolRequest::new("echo", json!({"turn": turn, "i": i})))
                .collect();
            return Ok(ReasoningOutcome::ToolRequests(requests));
        }
        Ok(ReasoningOutcome::message(format!("reply {}", turn)))
    })
}

/// Chain position after the plans, replaying the one-handoff-per-turn rule.
fn expected_position(plans: &[TurnPlan]) -> (usize, usize) {
    let last = CHAIN.len() - 1;
    let mut position = 0;
    let mut completed = 0;
    for plan in plans {
        let first = plan.handoffs >= 1 && position < last;
        let second = first && plan.handoffs >= 2 && position + 1 < last;
        if second {
            continue;
        }
        if first {
            position += 1;
        }
        completed += 1;
    }
    (position, completed)
}

struct Outcome {
    session: Session,
    registry: Arc<AgentRegistry>,
    /// Whether each turn succeeded.
    succeeded: Vec<bool>,
}

fn run_session(plans: &[TurnPlan], parallel: bool) -> Outcome {
    let gateway = Arc::new(
        ToolRouter::builder()
            .tool(Arc::new(FunctionTool::new("echo", "Echo", json!({}), |args| {
                Ok(args)
            })))
            .build(),
    );
    let mut registry = AgentRegistry::new();
    for (i, name) in CHAIN.iter().enumerate() {
        let mut agent = AgentDefinition::new(*name, "Help").with_parallel_tool_calls(parallel);
        if let Some(next) = CHAIN.get(i + 1) {
            agent = agent.with_handoff(*next);
        }
        registry.define(agent).unwrap();
        registry.attach_tools(name, gateway.as_ref(), &["echo"]).unwrap();
    }
    let registry = registry.into_shared().unwrap();

    let runner = Runner::new(
        registry.clone(),
        Arc::new(chain_reasoner(plans.to_vec())),
        gateway,
    );
    let mut session = Session::new("prop", registry.clone()).unwrap();
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let succeeded = rt.block_on(async {
        let mut succeeded = Vec::new();
        for turn in 0..plans.len() {
            match session
                .append_user_turn(&runner, &format!("message {}", turn))
                .await
            {
                Ok(_) => succeeded.push(true),
                Err(AgentsError::HandoffLimitExceeded { .. }) => succeeded.push(false),
                Err(other) => panic!("unexpected turn error: {}", other),
            }
        }
        succeeded
    });
    Outcome {
        session,
        registry,
        succeeded,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn active_agent_reachable_within_turn_count(
        plans in proptest::collection::vec(turn_plan(), 1..8),
        parallel in any::<bool>(),
    ) {
        let outcome = run_session(&plans, parallel);
        let active = outcome.session.current_agent().name.clone();

        let reachable = outcome.registry.reachable_within(CHAIN[0], plans.len());
        prop_assert!(reachable.contains(&active));

        // Only completed turns can move the session.
        let completed = outcome.succeeded.iter().filter(|ok| **ok).count();
        let reachable = outcome.registry.reachable_within(CHAIN[0], completed);
        prop_assert!(reachable.contains(&active));

        let (position, expected_completed) = expected_position(&plans);
        prop_assert_eq!(completed, expected_completed);
        prop_assert_eq!(active.as_str(), CHAIN[position]);
        prop_assert_eq!(outcome.session.turns(), completed);
    }

    #[test]
    fn completed_logs_pair_every_call(
        plans in proptest::collection::vec(turn_plan(), 1..6),
        parallel in any::<bool>(),
    ) {
        let outcome = run_session(&plans, parallel);
        let log = outcome.session.log();
        prop_assert!(log.is_complete());

        let calls: usize = plans
            .iter()
            .zip(&outcome.succeeded)
            .filter(|(_, ok)| **ok)
            .map(|(p, _)| p.tool_calls)
            .sum();
        let results = log.iter().filter(|e| e.tag() == "ToolResult").count();
        prop_assert_eq!(results, calls);
    }

    #[test]
    fn rendering_and_json_are_stable(
        plans in proptest::collection::vec(turn_plan(), 1..4),
    ) {
        let outcome = run_session(&plans, false);
        let log = outcome.session.log();
        prop_assert_eq!(render_log(log), render_log(log));

        let reloaded = EventLog::from_json(&log.to_json().unwrap()).unwrap();
        prop_assert_eq!(&reloaded, log);
        prop_assert_eq!(render_log(&reloaded), render_log(log));
    }
}
