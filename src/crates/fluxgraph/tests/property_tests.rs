//! Property-style checks for the invariants that matter most: progress is
//! monotonic, any DAG built by only wiring edges forward survives
//! validation, and backoff delay never decreases until it hits the cap.

use fluxgraph::{progress_percent, BackoffPolicy, Edge, Graph, Node};
use proptest::prelude::*;

proptest! {
    #[test]
    fn progress_percent_is_monotonic_in_finished(total in 1usize..200) {
        let mut prev = 0u8;
        for finished in 0..=total {
            let p = progress_percent(finished, total);
            prop_assert!(p >= prev);
            prop_assert!(p <= 100);
            prev = p;
        }
    }

    #[test]
    fn progress_percent_never_exceeds_100(finished in 0usize..500, total in 1usize..500) {
        prop_assert!(progress_percent(finished, total) <= 100);
    }

    #[test]
    fn forward_only_edges_are_always_acyclic(node_count in 2usize..12, seed in 0u64..1000) {
        // Build nodes 0..node_count and wire a handful of edges strictly
        // from a lower index to a higher one — such a graph can never
        // contain a cycle, so validation must always accept it.
        let mut graph = Graph::new("generated");
        for i in 0..node_count {
            graph = graph.add_node(Node::new(i.to_string(), "noop"));
        }
        let mut state = seed.wrapping_add(1);
        for from in 0..node_count {
            for to in (from + 1)..node_count {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                if state % 3 == 0 {
                    graph = graph.add_edge(Edge::new(from.to_string(), to.to_string()));
                }
            }
        }
        prop_assert!(graph.validate().is_ok());
    }

    #[test]
    fn backoff_delay_is_non_decreasing_until_the_cap(
        base in 0.1f64..10.0,
        factor in 1.0f64..3.0,
        max_delay in 5.0f64..100.0,
        k in 1usize..30,
    ) {
        let policy = BackoffPolicy::new(base, factor, max_delay);
        let earlier = policy.delay_for(k).as_secs_f64();
        let later = policy.delay_for(k + 1).as_secs_f64();
        prop_assert!(later >= earlier);
        prop_assert!(earlier <= max_delay + f64::EPSILON);
        prop_assert!(later <= max_delay + f64::EPSILON);
    }
}
