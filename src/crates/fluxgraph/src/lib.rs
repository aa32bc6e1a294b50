//! # fluxgraph - DAG-based multi-agent orchestration engine
//!
//! `fluxgraph` executes a validated directed acyclic graph of agent nodes:
//! topological scheduling under bounded concurrency, edge-driven data
//! propagation with conditional activation, per-node retry/timeout/optional
//! policy, cooperative cancellation, and a run event stream for
//! observability.
//!
//! ## Core Concepts
//!
//! - **Graph** ([`Graph`]) — an immutable set of [`Node`]s and [`Edge`]s
//!   plus per-run [`GraphOptions`]. [`Graph::validate`] rejects duplicate
//!   node ids, dangling edge endpoints, and cycles before any node runs.
//! - **Agent** ([`Agent`]) — a registered computation unit. Nodes reference
//!   agents by name; the engine checks input/output key contracts but
//!   never inspects the values themselves.
//! - **Engine** ([`Engine`]) — runs a validated graph to a [`RunOutcome`],
//!   emitting an [`Event`] for every node start/retry/done/fail and for the
//!   run's own terminal transition.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fluxgraph::{Engine, EngineConfig, Graph, Node, Edge, AgentRegistry, ToolRegistry, CancelToken, EventSink};
//!
//! # async fn run() -> fluxgraph::Result<()> {
//! let graph = Graph::new("pipeline")
//!     .add_node(Node::new("fetch", "http_fetch"))
//!     .add_node(Node::new("summarize", "llm_summarize"))
//!     .add_edge(Edge::new("fetch", "summarize"));
//! graph.validate()?;
//!
//! let agents = AgentRegistry::new();
//! let tools = ToolRegistry::new();
//! let config = EngineConfig::default();
//! let (sink, _events) = EventSink::new("r_00000000");
//!
//! let engine = Engine::new(&config);
//! let outcome = engine.execute(&graph, &agents, &tools, sink, CancelToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod registry;
pub mod runtime;
pub mod retry;

pub use condition::{evaluate_optional, Condition, Op};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use event::{progress_percent, Event, EventKind, EventSink};
pub use graph::{Edge, Graph, GraphId, GraphOptions, Node, Record};
pub use registry::{Agent, AgentRegistry, Tool, ToolLocator, ToolRegistry};
pub use retry::BackoffPolicy;
pub use runtime::{CancelToken, Engine, RunId, RunOutcome, RunStatus};
