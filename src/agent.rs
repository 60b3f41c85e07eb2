//! # Agent definitions
//!
//! An [`AgentDefinition`] is one persona in the conversation: a name,
//! instructions, model settings, the agents it may hand off to and the tools
//! it may call. Definitions are plain data. They refer to each other by name
//! only, so a handoff cycle (reception → sales → maintenance → reception)
//! needs no construction order and the whole set can be serialized.

use serde::{Deserialize, Serialize};

/// Default model used when a definition does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Tool-choice policy forwarded to the reasoning capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

/// Per-agent model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub tool_choice: ToolChoice,

    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Whether one reasoning step may dispatch its tool calls concurrently.
    pub parallel_tool_calls: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            tool_choice: ToolChoice::Auto,
            temperature: None,
            parallel_tool_calls: true,
        }
    }
}

impl ModelSettings {
    /// Deterministic, one-tool-at-a-time settings.
    pub fn sequential() -> Self {
        Self {
            tool_choice: ToolChoice::Auto,
            temperature: Some(0.0),
            parallel_tool_calls: false,
        }
    }
}

/// Immutable configuration for one agent.
///
/// ```rust
/// use agent_relay::agent::{AgentDefinition, ModelSettings};
///
/// let reception = AgentDefinition::new("ReceptionAssistant", "Greet the customer.")
///     .with_model_settings(ModelSettings::sequential())
///     .with_handoff("SalesAssistant")
///     .with_handoff("MaintenanceAssistant");
///
/// assert!(reception.can_hand_off_to("SalesAssistant"));
/// assert!(reception.tools().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique name, used as the handoff key.
    pub name: String,

    /// Directive text handed to the reasoning capability. Opaque here.
    pub instructions: String,

    /// Shown to agents that can hand off to this one.
    #[serde(default)]
    pub handoff_description: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub model_settings: ModelSettings,

    /// Names of agents this one may transfer control to, in advertised order.
    #[serde(default)]
    pub handoff_targets: Vec<String>,

    /// Tool names bound after construction by the registry.
    #[serde(default)]
    pub bound_tools: Vec<String>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: None,
            model: default_model(),
            model_settings: ModelSettings::default(),
            handoff_targets: Vec::new(),
            bound_tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.model_settings.temperature = Some(temperature);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.model_settings.tool_choice = choice;
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.model_settings.parallel_tool_calls = enabled;
        self
    }

    /// Adds a handoff target. Repeated names are ignored.
    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        if !self.handoff_targets.contains(&target) {
            self.handoff_targets.push(target);
        }
        self
    }

    pub fn with_handoffs<I, S>(self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        targets.into_iter().fold(self, |agent, t| agent.with_handoff(t))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn handoffs(&self) -> &[String] {
        &self.handoff_targets
    }

    pub fn tools(&self) -> &[String] {
        &self.bound_tools
    }

    pub fn can_hand_off_to(&self, target: &str) -> bool {
        self.handoff_targets.iter().any(|t| t == target)
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.bound_tools.iter().any(|t| t == tool_name)
    }

    /// Leaf agents cannot hand off anywhere.
    pub fn is_leaf(&self) -> bool {
        self.handoff_targets.is_empty()
    }

    pub(crate) fn bind_tools<I>(&mut self, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        for name in names {
            if !self.bound_tools.contains(&name) {
                self.bound_tools.push(name);
            }
        }
    }
}
