//! Error types for agent orchestration

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type for agent orchestration
#[derive(Debug, Error)]
pub enum AgentsError {
    /// The user input was empty; rejected before any state mutation.
    #[error("User input must not be empty")]
    EmptyInput,

    /// A handoff target is not among the source agent's handoff targets.
    #[error("Invalid handoff from '{from}' to '{to}'")]
    InvalidHandoff { from: String, to: String },

    /// The agent that received this turn's handoff asked to hand off again.
    #[error("Only one handoff per turn: '{from}' cannot transfer to '{to}'")]
    HandoffLimitExceeded { from: String, to: String },

    /// The reasoning/tool loop of a single turn ran past its guard.
    #[error("Maximum iterations exceeded: {max_iterations}")]
    MaxIterationsExceeded { max_iterations: usize },

    /// A tool failed. The runner folds this into the event log instead of
    /// aborting the turn.
    #[error("Tool execution error: {message}")]
    ToolExecutionError { message: String },

    /// Two agent definitions share a name.
    #[error("Duplicate agent name: {name}")]
    DuplicateName { name: String },

    /// Two agent names map to the same `transfer_to_*` function name.
    #[error("Agents '{existing}' and '{name}' share the handoff tool '{tool_name}'")]
    HandoffToolCollision {
        name: String,
        existing: String,
        tool_name: String,
    },

    #[error("Unknown agent: {name}")]
    UnknownAgent { name: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// A turn is already in flight for this session.
    #[error("Session '{session_id}' is already processing a turn")]
    SessionBusy { session_id: String },

    /// The turn was cancelled between iterations.
    #[error("Turn cancelled after {iterations} iteration(s)")]
    Cancelled { iterations: usize },

    /// The event log violates the tool-call pairing invariant.
    #[error("Invalid event log: {message}")]
    InvalidEventLog { message: String },

    /// The model returned something the runner cannot act on.
    #[error("Model behavior error: {message}")]
    ModelBehaviorError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AgentsError {
    /// Configuration defects that should stop startup or the turn and be
    /// surfaced to an operator.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AgentsError::DuplicateName { .. }
                | AgentsError::HandoffToolCollision { .. }
                | AgentsError::InvalidHandoff { .. }
                | AgentsError::UnknownAgent { .. }
                | AgentsError::UnknownTool { .. }
                | AgentsError::ConfigError { .. }
                | AgentsError::TomlError(_)
        )
    }
}
