//! The per-node attempt loop: contract checks, timeout, and exponential
//! backoff between retries (§4.4).
//!
//! Grounded on the teacher's `tooling::async_utils::timeout::with_timeout`
//! wrapper, inlined here via `tokio::time::timeout` directly since the
//! specialized error mapping (`AgentTimeout` carries the node id and
//! attempt number) is cheaper to do at the call site than to thread
//! through a generic helper.
//!
//! The concurrency semaphore lives here rather than in the scheduler's
//! dispatch loop: it bounds the number of agent invocations in flight
//! (§4.2), not the number of nodes being serviced. A node blocked on
//! backoff sleep or waiting on its contract checks to run holds no
//! permit, so an independent ready node can still take its slot.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{EventKind, EventSink};
use crate::graph::{GraphOptions, Node, Record};
use crate::registry::{Agent, AgentRegistry, ToolRegistry};
use crate::retry::BackoffPolicy;
use crate::runtime::run::CancelToken;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub struct NodeRunner<'a> {
    config: &'a EngineConfig,
    agents: &'a AgentRegistry,
    tools: &'a ToolRegistry,
    semaphore: &'a Semaphore,
}

impl<'a> NodeRunner<'a> {
    pub fn new(
        config: &'a EngineConfig,
        agents: &'a AgentRegistry,
        tools: &'a ToolRegistry,
        semaphore: &'a Semaphore,
    ) -> Self {
        Self {
            config,
            agents,
            tools,
            semaphore,
        }
    }

    /// Run `node` to completion: resolve its agent, verify tool/input
    /// contracts, then attempt-retry-backoff until it succeeds, is
    /// cancelled, or exhausts its retry budget.
    pub async fn run_node(
        &self,
        options: &GraphOptions,
        node: &Node,
        context: Record,
        sink: &EventSink,
        cancel: &CancelToken,
    ) -> Result<Record> {
        let agent = self
            .agents
            .get(&node.agent_type)
            .ok_or_else(|| EngineError::unknown_agent(&node.id, &node.agent_type))?;

        for tool in agent.required_tools() {
            if !self.tools.has(tool) {
                return Err(EngineError::missing_tool(&node.id, tool));
            }
        }

        let missing_inputs: Vec<String> = agent
            .input_schema()
            .iter()
            .filter(|k| !context.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !missing_inputs.is_empty() {
            return Err(EngineError::input_contract_violation(&node.id, missing_inputs));
        }

        let timeout_sec = node.timeout_sec.unwrap_or(options.default_timeout_sec);
        let max_retries = node.retries.unwrap_or(options.max_retries);
        let backoff = BackoffPolicy::new(
            self.config.retry_backoff_base,
            self.config.retry_backoff_factor,
            self.config.retry_max_delay_sec,
        );

        let mut attempt = 1usize;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            // Acquired here, before `node.start` fires, so the event
            // reflects a concurrency slot actually granted rather than
            // merely requested (§4.2). Dropped inside `run_attempt`, right
            // after the agent call resolves.
            let permit = tokio::select! {
                permit = self.semaphore.acquire() => permit.expect("semaphore is never closed"),
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            };

            debug!(run_id = sink.run_id(), node_id = %node.id, attempt, "node.start");
            sink.emit(EventKind::NodeStart {
                node_id: node.id.clone(),
                attempt,
            });

            let attempt_result = self
                .run_attempt(
                    agent.as_ref(),
                    &node.id,
                    context.clone(),
                    &node.params,
                    timeout_sec,
                    attempt,
                    cancel,
                    permit,
                )
                .await;

            match attempt_result {
                Ok(output) => return Ok(output),
                Err(e) if e.is_retriable() && attempt <= max_retries => {
                    warn!(
                        run_id = sink.run_id(),
                        node_id = %node.id,
                        attempt,
                        error = %e,
                        "node.retry"
                    );
                    sink.emit(EventKind::NodeRetry {
                        node_id: node.id.clone(),
                        error: e.to_string(),
                    });
                    let delay = backoff.delay_for(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Race the agent call against both its timeout and cancellation.
    /// Whichever fires first drops the other two futures, which is how a
    /// slow or hanging agent call is "forcibly aborted" (§4.2 step 3):
    /// dropping the future is the cooperative-cancellation boundary for
    /// whatever `.await` the agent was suspended on.
    ///
    /// `permit` is held across the agent call and dropped immediately
    /// after it resolves (§4.2, §4.4 steps 5b/5d) — not across the output
    /// contract check below, and not across the retry backoff sleep back
    /// in `run_node`'s loop.
    async fn run_attempt(
        &self,
        agent: &dyn Agent,
        node_id: &str,
        context: Record,
        params: &Record,
        timeout_sec: u64,
        attempt: usize,
        cancel: &CancelToken,
        permit: tokio::sync::SemaphorePermit<'_>,
    ) -> Result<Record> {
        let timed = tokio::time::timeout(
            Duration::from_secs(timeout_sec),
            agent.run(context, self.tools, params),
        );

        let outcome = tokio::select! {
            outcome = timed => outcome,
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        drop(permit);

        let output = match outcome {
            Err(_) => {
                return Err(EngineError::AgentTimeout {
                    node: node_id.to_string(),
                    attempt,
                    timeout_sec,
                })
            }
            Ok(Err(message)) => return Err(EngineError::agent_error(node_id, message)),
            Ok(Ok(output)) => output,
        };

        let missing_outputs: Vec<String> = agent
            .output_schema()
            .iter()
            .filter(|k| !output.contains_key(k.as_str()))
            .cloned()
            .collect();
        if missing_outputs.is_empty() {
            Ok(output)
        } else {
            Err(EngineError::output_contract_violation(node_id, missing_outputs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoAgent {
        input_schema: HashSet<String>,
        output_schema: HashSet<String>,
        required_tools: HashSet<String>,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }
        fn input_schema(&self) -> &HashSet<String> {
            &self.input_schema
        }
        fn output_schema(&self) -> &HashSet<String> {
            &self.output_schema
        }
        fn required_tools(&self) -> &HashSet<String> {
            &self.required_tools
        }
        async fn run(
            &self,
            context: Record,
            _tools: &dyn crate::registry::ToolLocator,
            _params: &Record,
        ) -> std::result::Result<Record, String> {
            Ok(context)
        }
    }

    struct FailNTimesAgent {
        remaining_failures: AtomicUsize,
    }

    #[async_trait]
    impl Agent for FailNTimesAgent {
        fn name(&self) -> &str {
            "flaky"
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
            _tools: &dyn crate::registry::ToolLocator,
            _params: &Record,
        ) -> std::result::Result<Record, String> {
            if self.remaining_failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err("not yet".to_string())
            } else {
                Ok(Record::new())
            }
        }
    }

    struct HangingAgent;

    #[async_trait]
    impl Agent for HangingAgent {
        fn name(&self) -> &str {
            "hanging"
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
            _tools: &dyn crate::registry::ToolLocator,
            _params: &Record,
        ) -> std::result::Result<Record, String> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn node(id: &str, agent_type: &str) -> Node {
        Node::new(id, agent_type)
    }

    #[tokio::test]
    async fn successful_run_returns_agent_output() {
        let mut agents = AgentRegistry::new();
        agents
            .register(Arc::new(EchoAgent {
                input_schema: HashSet::from(["x".to_string()]),
                output_schema: HashSet::new(),
                required_tools: HashSet::new(),
            }))
            .unwrap();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0001");
        let cancel = CancelToken::new();

        let mut ctx = Record::new();
        ctx.insert("x".to_string(), json!(1));
        let out = runner
            .run_node(&GraphOptions::default(), &node("A", "echo"), ctx, &sink, &cancel)
            .await
            .unwrap();
        assert_eq!(out.get("x"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn missing_required_tool_fails_without_retry() {
        let mut agents = AgentRegistry::new();
        agents
            .register(Arc::new(EchoAgent {
                input_schema: HashSet::new(),
                output_schema: HashSet::new(),
                required_tools: HashSet::from(["http".to_string()]),
            }))
            .unwrap();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0002");
        let cancel = CancelToken::new();

        let err = runner
            .run_node(
                &GraphOptions::default(),
                &node("A", "echo"),
                Record::new(),
                &sink,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingTool { .. }));
    }

    #[tokio::test]
    async fn unknown_agent_type_is_rejected() {
        let agents = AgentRegistry::new();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0003");
        let cancel = CancelToken::new();

        let err = runner
            .run_node(
                &GraphOptions::default(),
                &node("A", "ghost"),
                Record::new(),
                &sink,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownAgent { .. }));
    }

    #[tokio::test]
    async fn missing_input_keys_are_rejected_before_invoking_the_agent() {
        let mut agents = AgentRegistry::new();
        agents
            .register(Arc::new(EchoAgent {
                input_schema: HashSet::from(["needed".to_string()]),
                output_schema: HashSet::new(),
                required_tools: HashSet::new(),
            }))
            .unwrap();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0004");
        let cancel = CancelToken::new();

        let err = runner
            .run_node(
                &GraphOptions::default(),
                &node("A", "echo"),
                Record::new(),
                &sink,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InputContractViolation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds_honoring_backoff() {
        let mut agents = AgentRegistry::new();
        agents
            .register(Arc::new(FailNTimesAgent {
                remaining_failures: AtomicUsize::new(2),
            }))
            .unwrap();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, mut rx) = EventSink::new("r_test0005");
        let cancel = CancelToken::new();

        let started = std::time::Instant::now();
        let out = runner
            .run_node(
                &GraphOptions::default(),
                &node("A", "flaky"),
                Record::new(),
                &sink,
                &cancel,
            )
            .await
            .unwrap();
        assert!(out.is_empty());
        // Two retries at base=2.0, factor=2.0: 2s then 4s.
        assert!(started.elapsed() >= Duration::from_secs(6));

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        let retries = kinds
            .iter()
            .filter(|k| matches!(k, EventKind::NodeRetry { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_as_agent_timeout() {
        let mut agents = AgentRegistry::new();
        agents.register(Arc::new(HangingAgent)).unwrap();
        let tools = ToolRegistry::new();
        let mut config = EngineConfig::default();
        config.max_retries = 0;
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0006");
        let cancel = CancelToken::new();

        let n = node("A", "hanging").with_timeout_sec(5);
        // Under a paused clock, the runtime auto-advances to the pending
        // timeout timer once nothing else can make progress.
        let err = runner
            .run_node(&GraphOptions::default(), &n, Record::new(), &sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AgentTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_during_backoff_sleep_short_circuits() {
        let mut agents = AgentRegistry::new();
        agents
            .register(Arc::new(FailNTimesAgent {
                remaining_failures: AtomicUsize::new(5),
            }))
            .unwrap();
        let tools = ToolRegistry::new();
        let config = EngineConfig::default();
        let semaphore = Semaphore::new(1);
        let runner = NodeRunner::new(&config, &agents, &tools, &semaphore);
        let (sink, _rx) = EventSink::new("r_test0007");
        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = runner
            .run_node(
                &GraphOptions::default(),
                &node("A", "flaky"),
                Record::new(),
                &sink,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        handle.await.unwrap();
    }
}
