//! The run scheduler: topological dispatch under bounded concurrency
//! (§4.2, §4.4, §4.5).
//!
//! Grounded on the original source's `Executor.execute` — a ready queue, a
//! set of in-flight node futures, and a "wait for the next one to finish,
//! then re-fill the ready queue" loop — translated into
//! `futures::stream::FuturesUnordered` instead of `asyncio.Task` +
//! `asyncio.wait(FIRST_COMPLETED)`, since nothing here needs true OS-level
//! parallelism: node attempts are bounded by `.await` points (timeouts,
//! backoff sleeps, agent I/O), and a single poll loop interleaves them
//! exactly the way the original's event loop did. Every ready node is
//! dispatched into this loop as soon as it's ready — the concurrency bound
//! itself lives one level down, in [`NodeRunner`]'s semaphore, which gates
//! only the agent invocation inside each node's attempt loop (§4.2).

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{EventKind, EventSink};
use crate::graph::{Graph, Record};
use crate::registry::{AgentRegistry, ToolRegistry};
use crate::runtime::edge_activator::EdgeActivator;
use crate::runtime::node_runner::NodeRunner;
use crate::runtime::run::{CancelToken, RunId, RunOutcome, RunStatus};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::future::Future;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Executes validated graphs against a fixed agent/tool registry pair.
pub struct Engine<'a> {
    config: &'a EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Run `graph` to completion: entry nodes (no incoming edges) start
    /// with an empty context, and every other node's context is assembled
    /// from its incoming edges' projections once all of them have
    /// activated (§4.3, §4.4 step 3). Emits the full event sequence
    /// through `sink` and honors `cancel` cooperatively at node dispatch
    /// boundaries and during backoff sleeps (§4.6).
    pub async fn execute(
        &self,
        graph: &Graph,
        agents: &AgentRegistry,
        tools: &ToolRegistry,
        sink: EventSink,
        cancel: CancelToken,
    ) -> Result<RunOutcome> {
        graph.validate()?;

        for node in &graph.nodes {
            if !agents.has(&node.agent_type) {
                return Err(EngineError::unknown_agent(&node.id, &node.agent_type));
            }
        }

        let run_id = RunId::generate();
        let concurrency = self.config.effective_concurrency(graph.options.concurrency);
        let semaphore = Semaphore::new(concurrency);
        let runner = NodeRunner::new(self.config, agents, tools, &semaphore);
        let node_by_id: HashMap<&str, &crate::graph::Node> =
            graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut activator = EdgeActivator::new(graph);
        let mut ready: VecDeque<String> = activator.initially_ready().into();
        let total = graph.nodes.len();
        let mut finished = 0usize;
        let mut outputs: HashMap<String, Record> = HashMap::new();
        let mut fatal: Option<EngineError> = None;

        type NodeFuture<'f> = Pin<Box<dyn Future<Output = (String, Result<Record>)> + Send + 'f>>;
        let mut in_flight: FuturesUnordered<NodeFuture<'_>> = FuturesUnordered::new();

        loop {
            if fatal.is_none() && cancel.is_cancelled() {
                fatal = Some(EngineError::Cancelled);
            }

            if fatal.is_none() {
                while let Some(node_id) = ready.pop_front() {
                    let node = *node_by_id.get(node_id.as_str()).expect("ready node must exist");
                    // Every incoming edge of a ready node has already
                    // activated (the in-degree invariant), so each one's
                    // source output is already in `outputs` — assembling
                    // here, in declaration order, is deterministic
                    // regardless of which predecessor actually finished
                    // last (§4.4 step 3, §9).
                    let context = activator.take_context(&node_id, &outputs);
                    let sink = sink.clone();
                    let runner_ref = &runner;
                    let cancel_ref = &cancel;
                    let fut = async move {
                        let result = runner_ref
                            .run_node(&graph.options, node, context, &sink, cancel_ref)
                            .await;
                        (node_id, result)
                    };
                    in_flight.push(Box::pin(fut));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            if let Some((node_id, result)) = in_flight.next().await {
                finished += 1;
                let node = *node_by_id.get(node_id.as_str()).expect("finished node must exist");
                match result {
                    Ok(output) => {
                        let progress = crate::event::progress_percent(finished, total);
                        info!(run_id = %run_id, node_id = %node_id, progress, "node.done");
                        sink.emit(EventKind::NodeDone {
                            node_id: node_id.clone(),
                            progress_percent: progress,
                        });
                        let newly_ready = activator.on_node_finished(&node_id, &output);
                        outputs.insert(node_id, output);
                        ready.extend(newly_ready);
                    }
                    Err(e) if node.optional && e.is_absorbable() => {
                        let progress = crate::event::progress_percent(finished, total);
                        error!(
                            run_id = %run_id,
                            node_id = %node_id,
                            error = %e,
                            "node.fail_optional"
                        );
                        sink.emit(EventKind::NodeFailOptional {
                            node_id: node_id.clone(),
                            error: e.to_string(),
                            progress_percent: progress,
                        });
                        // Edge Activator is deliberately not invoked here
                        // (§4.4 step h): an optional-failed node's
                        // outgoing edges stay dead and its successors are
                        // permanently skipped.
                    }
                    Err(e) => {
                        // No node-level cancellation event exists in the
                        // taxonomy, so a node aborted by cancellation is
                        // reported the same way as any other fatal node
                        // failure; the run-level `run.cancelled` event
                        // below is what actually distinguishes the two.
                        error!(run_id = %run_id, node_id = %node_id, error = %e, "node.fail");
                        sink.emit(EventKind::NodeFail {
                            node_id: node_id.clone(),
                            error: e.to_string(),
                        });
                        // Cancellation always wins in reporting (§7): a
                        // concurrent peer failure never overwrites an
                        // already-observed cancellation.
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                        cancel.cancel();
                    }
                }
            }
        }

        let status = match &fatal {
            None => {
                info!(run_id = %run_id, "run.success");
                sink.emit(EventKind::RunSuccess);
                RunStatus::Success
            }
            Some(EngineError::Cancelled) => {
                error!(run_id = %run_id, "run.cancelled");
                sink.emit(EventKind::RunCancelled);
                RunStatus::Cancelled
            }
            Some(e) => {
                error!(run_id = %run_id, error = %e, "run.failed");
                sink.emit(EventKind::RunFailed {
                    error: e.to_string(),
                });
                RunStatus::Failed
            }
        };

        let outputs = if graph.sinks.is_empty() {
            outputs
        } else {
            outputs
                .into_iter()
                .filter(|(id, _)| graph.sinks.contains(id))
                .collect()
        };

        Ok(RunOutcome {
            run_id,
            status,
            outputs,
            sinks: graph.sinks.clone(),
            error: fatal.map(|e| e.to_string()),
        })
    }
}
