//! Graph data model (§3) and the Graph Validator (§4.1).
//!
//! A [`Graph`] is immutable once constructed — nothing in this module
//! mutates a `Graph` after `validate()` accepts it. Validation is pure
//! Kahn's-algorithm cycle detection plus endpoint/uniqueness checks; it
//! never touches edge conditions, which are runtime-dependent (§4.1).

use crate::condition::Condition;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Opaque per-node configuration and agent input/output records. The core
/// validates key *presence* only (§6); values are never inspected.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A graph identifier of the external form `g_<8 hex chars>` (§3, §6). The
/// core never mints these in production (an external registrar does) but
/// provides [`GraphId::generate`] for standalone use and tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn generate() -> Self {
        Self(format!("g_{}", random_hex8()))
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn random_hex8() -> String {
    let bytes = uuid::Uuid::new_v4();
    bytes.simple().to_string()[..8].to_string()
}

/// A single computation node in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within the graph.
    pub id: String,
    /// Agent registry name this node resolves to at run start.
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Opaque params handed to the agent verbatim.
    #[serde(default)]
    pub params: Record,
    /// Per-node override of `options.default_timeout_sec`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    /// Per-node override of `options.max_retries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<usize>,
    /// If true, terminal failure after retries is absorbed (§4.4 step h).
    #[serde(default)]
    pub optional: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            params: Record::new(),
            timeout_sec: None,
            retries: None,
            optional: false,
        }
    }

    pub fn with_params(mut self, params: Record) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout_sec(mut self, secs: u64) -> Self {
        self.timeout_sec = Some(secs);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A data-mapping edge between two nodes.
///
/// `map` projects destination-context keys to source-output keys:
/// `{dst_key: src_key}`. Multiple edges between the same pair are
/// permitted and activate independently (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub map: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<Condition>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            map: HashMap::new(),
            cond: None,
        }
    }

    pub fn with_map(mut self, map: HashMap<String, String>) -> Self {
        self.map = map;
        self
    }

    pub fn with_cond(mut self, cond: Condition) -> Self {
        self.cond = Some(cond);
        self
    }

    /// Project `output` through this edge's `map`: for each `(dst_key,
    /// src_key)`, take `output[src_key]` (absent -> `Value::Null`, §4.3).
    pub fn project(&self, output: &Record) -> Record {
        let mut ctx = Record::new();
        for (dst_key, src_key) in &self.map {
            let v = output.get(src_key).cloned().unwrap_or(serde_json::Value::Null);
            ctx.insert(dst_key.clone(), v);
        }
        ctx
    }
}

/// Execution defaults attached to a graph (§3). Per-node `timeout_sec`/
/// `retries` override these; `concurrency` is further capped by
/// [`crate::config::EngineConfig::max_concurrency`] (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOptions {
    pub default_timeout_sec: u64,
    pub max_retries: usize,
    pub concurrency: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            default_timeout_sec: 30,
            max_retries: 3,
            concurrency: 5,
        }
    }
}

/// An immutable, validated DAG of nodes and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub options: GraphOptions,
    /// Node ids whose outputs form the run result. Empty ⇒ all outputs
    /// are returned (§4.5).
    #[serde(default)]
    pub sinks: Vec<String>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            options: GraphOptions::default(),
            sinks: Vec::new(),
        }
    }

    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sinks(mut self, sinks: Vec<String>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Incoming edges of `node_id`, in declaration order — the merge order
    /// used by the Node Runner's context assembly (§4.4 step 3).
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.to == node_id)
    }

    /// Outgoing edges of `node_id`, in declaration order.
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from == node_id)
    }

    /// Static validation (§4.1): unique node ids, edges that resolve to
    /// known nodes, no cycles, and sane `options`. Pure — never mutates
    /// `self`. Must be called, and must succeed, before a run starts.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for n in &self.nodes {
            if !seen.insert(n.id.as_str()) {
                return Err(EngineError::invalid_graph(format!(
                    "duplicate node id '{}'",
                    n.id
                )));
            }
        }

        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for e in &self.edges {
            if !node_ids.contains(e.from.as_str()) {
                return Err(EngineError::invalid_graph(format!(
                    "edge references unknown source node '{}'",
                    e.from
                )));
            }
            if !node_ids.contains(e.to.as_str()) {
                return Err(EngineError::invalid_graph(format!(
                    "edge references unknown target node '{}'",
                    e.to
                )));
            }
        }

        if self.options.concurrency == 0 {
            return Err(EngineError::invalid_graph(
                "options.concurrency must be positive",
            ));
        }
        if self.options.default_timeout_sec == 0 {
            return Err(EngineError::invalid_graph(
                "options.default_timeout_sec must be positive",
            ));
        }

        self.check_acyclic()
    }

    /// Kahn's algorithm: O(|V|+|E|). Fails with `InvalidGraph` if fewer
    /// than `|nodes|` nodes can be peeled off, meaning a cycle remains.
    fn check_acyclic(&self) -> Result<()> {
        let mut indeg: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        let mut children: HashMap<&str, Vec<&str>> =
            self.nodes.iter().map(|n| (n.id.as_str(), Vec::new())).collect();

        for e in &self.edges {
            *indeg.get_mut(e.to.as_str()).unwrap() += 1;
            children.get_mut(e.from.as_str()).unwrap().push(e.to.as_str());
        }

        let mut queue: Vec<&str> = indeg
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop() {
            visited += 1;
            for &child in &children[id] {
                let d = indeg.get_mut(child).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push(child);
                }
            }
        }

        if visited != self.nodes.len() {
            return Err(EngineError::invalid_graph("cycle detected in graph"));
        }
        Ok(())
    }

    /// Parse a graph from a YAML document (§11: supplemented from the
    /// original source's sibling file-config conventions; not a new DSL,
    /// just the derived `Serialize`/`Deserialize` impls above).
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Render this graph back to YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
