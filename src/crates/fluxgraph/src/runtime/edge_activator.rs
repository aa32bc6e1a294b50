//! Edge activation and input-context assembly (§4.3, §4.4 step 3).
//!
//! In-degree is counted per incoming *edge*, not per distinct predecessor:
//! a node with two edges from the same upstream node needs both to
//! activate before it is ready. An edge whose condition evaluates false is
//! "dead" for the run — its target's in-degree never reaches zero through
//! that edge, which is the mechanism by which conditional branches (and
//! whole downstream subgraphs) are skipped rather than merely delayed.
//!
//! Context is deliberately NOT assembled here as predecessors finish: two
//! edges into the same node can write the same destination key, and the
//! merge winner must be whichever edge comes later in the graph's
//! declaration order, not whichever predecessor happened to finish last at
//! runtime. So `on_node_finished` only tracks which edges have activated;
//! the scheduler reconstructs a ready node's context from stored
//! predecessor outputs in one deterministic pass at dispatch time
//! (`take_context`), the same way `original_source/executor.py` rebuilds
//! `ctx` fresh by iterating `graph.edges` in declaration order rather than
//! accumulating it as nodes complete.

use crate::condition::evaluate_optional;
use crate::graph::{Graph, Record};
use std::collections::{HashMap, HashSet};

pub struct EdgeActivator<'g> {
    graph: &'g Graph,
    indeg: HashMap<&'g str, usize>,
    activated: HashSet<usize>,
}

impl<'g> EdgeActivator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        let mut indeg: HashMap<&str, usize> =
            graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
        for edge in &graph.edges {
            *indeg.get_mut(edge.to.as_str()).unwrap() += 1;
        }
        Self {
            graph,
            indeg,
            activated: HashSet::new(),
        }
    }

    /// Node ids with no incoming edges at all — the scheduler's initial
    /// ready set.
    pub fn initially_ready(&self) -> Vec<String> {
        self.indeg
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id.to_string())
            .collect()
    }

    /// Record that `node_id` finished successfully with `output`: evaluate
    /// every outgoing edge's condition against its own projection of
    /// `output`, mark the ones that activate, and decrement the in-degree
    /// of each activated edge's target. Returns node ids that just became
    /// ready. Does not touch any downstream context — see `take_context`.
    ///
    /// Must NOT be called for an optional-failed node (§4.4 step h) — its
    /// outgoing edges stay dead and its successors are permanently
    /// skipped, which this function cannot express since it only ever
    /// decrements in-degree.
    pub fn on_node_finished(&mut self, node_id: &str, output: &Record) -> Vec<String> {
        let mut newly_ready = Vec::new();
        for (idx, edge) in self.graph.edges.iter().enumerate() {
            if edge.from != node_id {
                continue;
            }
            let projected = edge.project(output);
            if !evaluate_optional(edge.cond.as_ref(), &projected) {
                continue;
            }
            self.activated.insert(idx);
            if let Some(remaining) = self.indeg.get_mut(edge.to.as_str()) {
                *remaining -= 1;
                if *remaining == 0 {
                    newly_ready.push(edge.to.clone());
                }
            }
        }
        newly_ready
    }

    /// Assemble `node_id`'s input context from its activated incoming
    /// edges, in graph declaration order — later edges overwrite earlier
    /// ones on key conflicts (§4.4 step 3, §9), regardless of which
    /// predecessor actually finished first at runtime. `outputs` must
    /// already hold every activated edge's source output, which the
    /// per-edge in-degree invariant guarantees: `node_id` cannot be ready
    /// until each of its incoming edges has activated, and an edge only
    /// activates once its source node has finished and been recorded.
    pub fn take_context(&self, node_id: &str, outputs: &HashMap<String, Record>) -> Record {
        let mut ctx = Record::new();
        for (idx, edge) in self.graph.edges.iter().enumerate() {
            if edge.to != node_id || !self.activated.contains(&idx) {
                continue;
            }
            if let Some(output) = outputs.get(&edge.from) {
                for (k, v) in edge.project(output) {
                    ctx.insert(k, v);
                }
            }
        }
        ctx
    }
}
