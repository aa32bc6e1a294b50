//! A classifier routes to exactly one of two downstream branches: the
//! edge whose condition doesn't match stays dead and its target node is
//! permanently skipped, never invoked at all.
//!
//! Run with: `cargo run --example conditional_fanout -p fluxgraph`

use async_trait::async_trait;
use fluxgraph::{
    condition::{Condition, Op},
    AgentRegistry, CancelToken, Edge, Engine, EngineConfig, EventSink, Graph, Node, Record,
    ToolLocator, ToolRegistry,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct ClassifyAgent;

#[async_trait]
impl fluxgraph::Agent for ClassifyAgent {
    fn name(&self) -> &str {
        "classify"
    }
    fn input_schema(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    fn output_schema(&self) -> &HashSet<String> {
        static SCHEMA: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| HashSet::from(["label".to_string()]))
    }
    fn required_tools(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    async fn run(
        &self,
        _context: Record,
        _tools: &dyn ToolLocator,
        _params: &Record,
    ) -> std::result::Result<Record, String> {
        let mut out = Record::new();
        out.insert("label".to_string(), json!("spam"));
        Ok(out)
    }
}

struct NotifyAgent(&'static str);

#[async_trait]
impl fluxgraph::Agent for NotifyAgent {
    fn name(&self) -> &str {
        self.0
    }
    fn input_schema(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    fn output_schema(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    fn required_tools(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    async fn run(
        &self,
        _context: Record,
        _tools: &dyn ToolLocator,
        _params: &Record,
    ) -> std::result::Result<Record, String> {
        println!("  -> {} branch handled the message", self.0);
        Ok(Record::new())
    }
}

#[tokio::main]
async fn main() -> fluxgraph::Result<()> {
    tracing_subscriber::fmt::init();

    let graph = Graph::new("classify_and_route")
        .add_node(Node::new("classify", "classify"))
        .add_node(Node::new("quarantine", "notify_quarantine"))
        .add_node(Node::new("inbox", "notify_inbox"))
        .add_edge(
            Edge::new("classify", "quarantine")
                .with_map(HashMap::from([("label".to_string(), "label".to_string())]))
                .with_cond(Condition::new("label", Op::Eq, json!("spam"))),
        )
        .add_edge(
            Edge::new("classify", "inbox")
                .with_map(HashMap::from([("label".to_string(), "label".to_string())]))
                .with_cond(Condition::new("label", Op::Ne, json!("spam"))),
        );
    graph.validate()?;

    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(ClassifyAgent))?;
    agents.register(Arc::new(NotifyAgent("notify_quarantine")))?;
    agents.register(Arc::new(NotifyAgent("notify_inbox")))?;
    let tools = ToolRegistry::new();
    let config = EngineConfig::default();

    let (sink, mut events) = EventSink::new("r_demo0002");
    let watcher = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[event] {:?}", event.kind);
        }
    });

    let engine = Engine::new(&config);
    let outcome = engine
        .execute(&graph, &agents, &tools, sink, CancelToken::new())
        .await?;

    let _ = watcher.await;
    println!("run {} finished as {:?}", outcome.run_id, outcome.status);
    Ok(())
}
