//! A two-node pipeline: fetch then summarize, wired by a single edge.
//!
//! Run with: `cargo run --example linear_pipeline -p fluxgraph`

use async_trait::async_trait;
use fluxgraph::{
    AgentRegistry, CancelToken, Edge, Engine, EngineConfig, EventSink, Graph, Node, Record,
    ToolLocator, ToolRegistry,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct FetchAgent;

#[async_trait]
impl fluxgraph::Agent for FetchAgent {
    fn name(&self) -> &str {
        "http_fetch"
    }
    fn input_schema(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    fn output_schema(&self) -> &HashSet<String> {
        static SCHEMA: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| HashSet::from(["body".to_string()]))
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
        out.insert("body".to_string(), json!("the quick brown fox"));
        Ok(out)
    }
}

struct SummarizeAgent;

#[async_trait]
impl fluxgraph::Agent for SummarizeAgent {
    fn name(&self) -> &str {
        "llm_summarize"
    }
    fn input_schema(&self) -> &HashSet<String> {
        static SCHEMA: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| HashSet::from(["text".to_string()]))
    }
    fn output_schema(&self) -> &HashSet<String> {
        static SCHEMA: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| HashSet::from(["summary".to_string()]))
    }
    fn required_tools(&self) -> &HashSet<String> {
        static EMPTY: std::sync::OnceLock<HashSet<String>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(HashSet::new)
    }
    async fn run(
        &self,
        context: Record,
        _tools: &dyn ToolLocator,
        _params: &Record,
    ) -> std::result::Result<Record, String> {
        let text = context.get("text").and_then(|v| v.as_str()).unwrap_or("");
        let mut out = Record::new();
        out.insert("summary".to_string(), json!(format!("{} words", text.split_whitespace().count())));
        Ok(out)
    }
}

#[tokio::main]
async fn main() -> fluxgraph::Result<()> {
    tracing_subscriber::fmt::init();

    let graph = Graph::new("fetch_and_summarize")
        .add_node(Node::new("fetch", "http_fetch"))
        .add_node(Node::new("summarize", "llm_summarize"))
        .add_edge(Edge::new("fetch", "summarize").with_map(HashMap::from([(
            "text".to_string(),
            "body".to_string(),
        )])));
    graph.validate()?;

    let mut agents = AgentRegistry::new();
    agents.register(Arc::new(FetchAgent))?;
    agents.register(Arc::new(SummarizeAgent))?;
    let tools = ToolRegistry::new();
    let config = EngineConfig::default();

    let (sink, mut events) = EventSink::new("r_demo0001");
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
    for (node_id, output) in &outcome.outputs {
        println!("  {node_id}: {output:?}");
    }
    Ok(())
}
