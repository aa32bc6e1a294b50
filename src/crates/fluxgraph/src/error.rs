//! Error types surfaced by graph validation and run execution.
//!
//! `EngineError` enumerates every failure kind in the orchestration engine's
//! error taxonomy: pre-run validation failures, per-node contract
//! violations, timeouts, and the handful of fatal conditions (missing
//! agent, event sink failure) that unwind a run regardless of retry or
//! `optional` policy.

use thiserror::Error;

/// Convenience result type using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// All failure kinds the engine can surface, from graph validation through
/// run termination.
///
/// Retry and `optional`-absorption policy for each variant is documented on
/// [`EngineError::is_retriable`] and [`EngineError::is_absorbable`] rather
/// than duplicated per-variant here.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Graph failed static validation (duplicate node id, dangling edge
    /// endpoint, cycle, or an invalid `options` value). Raised before any
    /// run state is created.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A node names an agent type that is not registered.
    #[error("node '{node}' references unknown agent '{agent}'")]
    UnknownAgent { node: String, agent: String },

    /// An agent's `required_tools` names a tool absent from the tool
    /// registry at run start.
    #[error("node '{node}' is missing required tool '{tool}'")]
    MissingTool { node: String, tool: String },

    /// The assembled input context for a node is missing one or more keys
    /// the agent's `input_schema` requires.
    #[error("node '{node}' input missing required keys: {missing:?}")]
    InputContractViolation { node: String, missing: Vec<String> },

    /// An agent's output is missing one or more keys its `output_schema`
    /// requires.
    #[error("node '{node}' output missing required keys: {missing:?}")]
    OutputContractViolation { node: String, missing: Vec<String> },

    /// A node attempt exceeded its effective per-attempt timeout.
    #[error("node '{node}' attempt {attempt} timed out after {timeout_sec}s")]
    AgentTimeout {
        node: String,
        attempt: usize,
        timeout_sec: u64,
    },

    /// The agent's `run` returned an error for a reason other than the
    /// variants above.
    #[error("node '{node}' agent error: {message}")]
    AgentError { node: String, message: String },

    /// The run's cancel-flag was observed set, either before a node started
    /// or while an attempt was in flight.
    #[error("run cancelled")]
    Cancelled,

    /// The caller-supplied event sink returned an error. Fatal: the run
    /// cannot guarantee event delivery from this point on.
    #[error("event sink error: {0}")]
    EventSinkError(String),

    /// `EngineConfig` construction violated one of its own invariants
    /// (e.g. `max_concurrency < default_concurrency`).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Graph (de)serialization failed (YAML load/dump helpers, §11).
    #[error("graph serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn invalid_graph(msg: impl Into<String>) -> Self {
        Self::InvalidGraph(msg.into())
    }

    pub fn unknown_agent(node: impl Into<String>, agent: impl Into<String>) -> Self {
        Self::UnknownAgent {
            node: node.into(),
            agent: agent.into(),
        }
    }

    pub fn missing_tool(node: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::MissingTool {
            node: node.into(),
            tool: tool.into(),
        }
    }

    pub fn input_contract_violation(node: impl Into<String>, missing: Vec<String>) -> Self {
        Self::InputContractViolation {
            node: node.into(),
            missing,
        }
    }

    pub fn output_contract_violation(node: impl Into<String>, missing: Vec<String>) -> Self {
        Self::OutputContractViolation {
            node: node.into(),
            missing,
        }
    }

    pub fn agent_error(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentError {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Whether the Node Runner's attempt loop (§4.4) should retry this
    /// failure if attempts remain, rather than treat it as immediately
    /// fatal.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::InputContractViolation { .. }
                | Self::OutputContractViolation { .. }
                | Self::AgentTimeout { .. }
                | Self::AgentError { .. }
        )
    }

    /// Whether a `node.optional = true` node absorbs this failure after
    /// retries are exhausted, rather than unwinding to the scheduler.
    pub fn is_absorbable(&self) -> bool {
        matches!(
            self,
            Self::MissingTool { .. }
                | Self::InputContractViolation { .. }
                | Self::OutputContractViolation { .. }
                | Self::AgentTimeout { .. }
                | Self::AgentError { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
