//! Tool Registry, Agent Registry, and the plug-in agent/tool contracts
//! (§2.1, §6).
//!
//! Registration is one-shot: a duplicate name is an error. Lookup is
//! read-only during a run — the registries are never mutated once a run
//! has started (§5, "Shared-resource policy").

use crate::error::{EngineError, Result};
use crate::graph::Record;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A capability an agent may invoke through the [`ToolLocator`] passed into
/// `Agent::run`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, args: Record) -> std::result::Result<Record, String>;
}

/// A read-only view over the [`ToolRegistry`], passed into every agent
/// invocation (§6.2). Agents never see the registry itself, only this
/// locator, so they cannot register new tools mid-run.
pub trait ToolLocator: Send + Sync {
    fn has(&self, name: &str) -> bool;
    fn get(&self, name: &str) -> Option<Arc<dyn Tool>>;
}

/// A plug-in computation unit. The core never inspects context/output
/// *values*, only key presence against `input_schema`/`output_schema`
/// (§6.1).
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn input_schema(&self) -> &HashSet<String>;
    fn output_schema(&self) -> &HashSet<String>;
    fn required_tools(&self) -> &HashSet<String>;

    /// Execute with the assembled input context, a tool locator, and the
    /// node's opaque params. Errors are wrapped as `AgentError` by the Node
    /// Runner unless the implementation prefers a more specific message.
    async fn run(
        &self,
        context: Record,
        tools: &dyn ToolLocator,
        params: &Record,
    ) -> std::result::Result<Record, String>;
}

/// Name → handler map for tools. One-shot registration, read-only lookup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Errors if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(EngineError::invalid_graph(format!(
                "tool '{}' already registered",
                name
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register unless a tool with this name already exists (§11,
    /// supplemented from the original source's bootstrap-if-absent
    /// pattern) — lets a caller compose built-ins with user overrides
    /// without the core hardcoding what "built-in" means.
    pub fn register_if_absent(&mut self, tool: Arc<dyn Tool>) {
        self.tools.entry(tool.name().to_string()).or_insert(tool);
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolLocator for ToolRegistry {
    fn has(&self, name: &str) -> bool {
        ToolRegistry::has(self, name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        ToolRegistry::get(self, name)
    }
}

/// Name → handler map for agents. One-shot registration, read-only lookup.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(EngineError::invalid_graph(format!(
                "agent '{}' already registered",
                name
            )));
        }
        self.agents.insert(name, agent);
        Ok(())
    }

    pub fn register_if_absent(&mut self, agent: Arc<dyn Agent>) {
        self.agents.entry(agent.name().to_string()).or_insert(agent);
    }

    pub fn has(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
