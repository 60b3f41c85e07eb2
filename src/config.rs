//! Configuration for the relay
//!
//! [`AppConfig`] describes the agents, the turn guard, the tool gateway
//! policies and the database the SQL tools connect to. It loads from a TOML
//! file and is then overridden from the environment.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::{AgentDefinition, ModelSettings, ToolChoice, DEFAULT_MODEL};
use crate::error::Result;
use crate::gateway::ToolGateway;
use crate::registry::AgentRegistry;
use crate::runner::{RunConfig, DEFAULT_MAX_ITERATIONS};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model for agents that do not name one
    pub model: String,

    /// Reasoning steps allowed per turn
    pub max_iterations: usize,

    /// Per tool call, in seconds
    pub tool_timeout_secs: Option<u64>,

    /// In-flight tool calls across the whole gateway
    pub max_tool_concurrency: Option<usize>,

    pub database_url: String,

    /// Enable debug logging
    pub debug_mode: bool,

    /// Agent every session starts with; the first agent when unset
    pub root_agent: Option<String>,

    pub agents: Vec<AgentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout_secs: None,
            max_tool_concurrency: None,
            database_url: "sqlite::memory:".to_string(),
            debug_mode: false,
            root_agent: None,
            agents: Vec::new(),
        }
    }
}

/// One `[[agents]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub handoff_description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default)]
    pub handoffs: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            model: None,
            tool_choice: ToolChoice::Auto,
            temperature: None,
            parallel_tool_calls: None,
            handoffs: Vec::new(),
            tools: Vec::new(),
        }
    }

    /// The definition this table describes, without tool bindings.
    pub fn to_definition(&self, default_model: &str) -> AgentDefinition {
        let defaults = ModelSettings::default();
        let settings = ModelSettings {
            tool_choice: self.tool_choice,
            temperature: self.temperature,
            parallel_tool_calls: self
                .parallel_tool_calls
                .unwrap_or(defaults.parallel_tool_calls),
        };
        let mut agent = AgentDefinition::new(&self.name, &self.instructions)
            .with_model(self.model.as_deref().unwrap_or(default_model))
            .with_model_settings(settings)
            .with_handoffs(self.handoffs.iter().cloned());
        if let Some(description) = &self.handoff_description {
            agent = agent.with_handoff_description(description);
        }
        agent
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Defaults overridden from the environment
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// File (when given) then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(config.apply_env())
    }

    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `OPENAI_MODEL`, `AGENTS_MAX_ITERATIONS`, `DATABASE_URL`,
    /// `AGENTS_DEBUG` and `AGENTS_TOOL_TIMEOUT` as read by `lookup`.
    /// Unparsable numbers are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.model = model;
        }

        if let Some(raw) = lookup("AGENTS_MAX_ITERATIONS") {
            match raw.parse::<usize>() {
                Ok(n) => self.max_iterations = n,
                Err(_) => warn!(value = %raw, "Ignoring AGENTS_MAX_ITERATIONS"),
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }

        if let Some(debug) = lookup("AGENTS_DEBUG") {
            self.debug_mode = debug.to_lowercase() == "true" || debug == "1";
        }

        if let Some(raw) = lookup("AGENTS_TOOL_TIMEOUT") {
            match raw.parse::<u64>() {
                Ok(secs) => self.tool_timeout_secs = Some(secs),
                Err(_) => warn!(value = %raw, "Ignoring AGENTS_TOOL_TIMEOUT"),
            }
        }

        self
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig::default().with_max_iterations(self.max_iterations)
    }

    /// Defines every configured agent, binds its tools from `gateway` and
    /// freezes the registry.
    pub fn build_registry(&self, gateway: &dyn ToolGateway) -> Result<Arc<AgentRegistry>> {
        let mut registry = AgentRegistry::new();
        for agent in &self.agents {
            registry.define(agent.to_definition(&self.model))?;
        }
        for agent in &self.agents {
            if !agent.tools.is_empty() {
                registry.attach_tools(&agent.name, gateway, agent.tools.as_slice())?;
            }
        }
        if let Some(root) = &self.root_agent {
            registry.set_root(root)?;
        }
        registry.into_shared()
    }
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout_secs = Some(timeout.as_secs());
        self
    }

    pub fn max_tool_concurrency(mut self, limit: usize) -> Self {
        self.config.max_tool_concurrency = Some(limit);
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn root_agent(mut self, name: impl Into<String>) -> Self {
        self.config.root_agent = Some(name.into());
        self
    }

    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.config.agents.push(agent);
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
