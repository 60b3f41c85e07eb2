//! # Agent Relay
//!
//! Multi-agent conversation orchestration: a customer's dialogue is routed
//! among specialized agents (reception, sales, maintenance), each with its
//! own instructions, model settings and tool access. Agents transfer control
//! to one another through handoffs, and every step of the conversation is
//! recorded in an ordered, replayable event log.
//!
//! ## Core Concepts
//!
//! - **[`AgentDefinition`]**: one persona; names its handoff targets and tools
//! - **[`AgentRegistry`]**: the closed set of agents, frozen after setup
//! - **[`EventLog`]**: append-only record of user turns, assistant turns, tool
//!   calls, tool results and handoffs
//! - **[`ToolGateway`]**: injected tool executor; failures come back as data
//! - **[`ModelProvider`]**: injected reasoning step deciding what an agent does next
//! - **[`Runner`]**: drives one turn through reasoning, tools and handoffs
//! - **[`Session`]**: active agent plus log, one turn at a time
//!
//! ## Getting Started
//!
//! ```rust
//! use agent_relay::{
//!     AgentDefinition, AgentRegistry, EventLog, Runner, ScriptedReasoner, ToolRouter,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> agent_relay::Result<()> {
//! let gateway = Arc::new(ToolRouter::builder().build());
//!
//! let mut registry = AgentRegistry::new();
//! registry.define(
//!     AgentDefinition::new("ReceptionAssistant", "Greet and route the customer.")
//!         .with_handoff("SalesAssistant"),
//! )?;
//! registry.define(AgentDefinition::new("SalesAssistant", "Help the customer buy a car."))?;
//! let registry = registry.into_shared()?;
//!
//! let reasoner = ScriptedReasoner::new()
//!     .with_handoff("SalesAssistant")
//!     .with_message("We have three models in stock.");
//! let runner = Runner::new(registry, Arc::new(reasoner), gateway);
//!
//! let mut log = EventLog::new();
//! let outcome = runner.run("ReceptionAssistant", &mut log, "I want to buy a car").await?;
//! assert_eq!(outcome.active_agent, "SalesAssistant");
//! assert_eq!(log.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod items;
pub mod model;
pub mod registry;
pub mod render;
pub mod runner;
pub mod session;
pub mod sql_tools;
pub mod telemetry;
pub mod tool;

pub use agent::{AgentDefinition, ModelSettings, ToolChoice};
pub use config::{AgentConfig, AppConfig, ConfigBuilder};
pub use error::{AgentsError, Result};
pub use gateway::{ToolGateway, ToolRouter};
pub use items::{Event, EventLog};
pub use model::{
    ModelProvider, OpenAIProvider, ReasonerFn, ReasoningOutcome, ReasoningRequest,
    ScriptedReasoner, ToolRequest,
};
pub use registry::AgentRegistry;
pub use render::{render_json_lenient, render_log};
pub use runner::{RunConfig, Runner, TurnOutcome};
pub use session::{Session, SessionManager, SessionSnapshot};
pub use sql_tools::SqlToolServer;
pub use tool::{FunctionTool, Tool, ToolResult, ToolSpec};
