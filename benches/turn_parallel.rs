use agent_relay::model::{ReasoningOutcome, ToolRequest};
use agent_relay::{
    AgentDefinition, AgentRegistry, EventLog, FunctionTool, Runner, ScriptedReasoner, ToolRouter,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

// One reasoning step requesting `tool_calls` slow calls, then a final message.
fn script(tool_calls: usize) -> Arc<ScriptedReasoner> {
    let requests = (0..tool_calls)
        .map(|i| ToolRequest::new("slow", json!({"input": i.to_string()})))
        .collect();
    Arc::new(
        ScriptedReasoner::new()
            .with_outcome(ReasoningOutcome::ToolRequests(requests))
            .with_message("done"),
    )
}

fn setup(parallel: bool) -> (Arc<AgentRegistry>, Arc<ToolRouter>) {
    let gateway = Arc::new(
        ToolRouter::builder()
            .tool(Arc::new(FunctionTool::from_async(
                "slow",
                "Sleeps briefly",
                json!({"type":"object","properties":{"input":{"type":"string"}},"required":["input"]}),
                |_args| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(json!("ok"))
                },
            )))
            .build(),
    );
    let mut registry = AgentRegistry::new();
    registry
        .define(AgentDefinition::new("Bench", "Use tools").with_parallel_tool_calls(parallel))
        .unwrap();
    registry
        .attach_tools("Bench", gateway.as_ref(), &["slow"])
        .unwrap();
    (registry.into_shared().unwrap(), gateway)
}

fn bench_turns(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    for (label, parallel) in [("turn_sequential_8tools", false), ("turn_parallel_8tools", true)] {
        let (registry, gateway) = setup(parallel);
        c.bench_function(label, |b| {
            b.to_async(&rt).iter_batched(
                || Runner::new(registry.clone(), script(8), gateway.clone()),
                |runner| async move {
                    let mut log = EventLog::new();
                    runner.run("Bench", &mut log, "run").await.unwrap();
                },
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, bench_turns);
criterion_main!(benches);
