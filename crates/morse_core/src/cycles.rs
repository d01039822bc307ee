//! Extremal mean cycles over a well-formed cluster graph, after Karp.
//!
//! A graph is well-formed when it is a single strongly connected component
//! whose node keys are exactly their own indices. Node weights are read as
//! the cost of every edge entering that node, and the extremal average
//! weight around any cycle falls out of the shortest-path-of-length-i
//! table D[i][v] built by edge relaxation from node 0.

use tracing::debug;

use crate::error::MorseError;
use crate::graph::DiGraph;

// Distances at or above SENTINEL - SENTINEL_TOLERANCE count as unreachable;
// the tolerance absorbs floating error accumulated by relaxation.
const SENTINEL: f64 = 1e18;
const SENTINEL_TOLERANCE: f64 = 1.0;

fn is_unreachable(distance: f64) -> bool {
    distance >= SENTINEL - SENTINEL_TOLERANCE
}

fn ensure_well_formed(graph: &DiGraph<usize>, weights: &[f64]) -> Result<(), MorseError> {
    let n = graph.node_count();
    if n == 0 {
        return Err(MorseError::MalformedGraph {
            reason: "graph has no nodes".to_string(),
        });
    }
    if weights.len() != n {
        return Err(MorseError::MalformedGraph {
            reason: format!("{} weights supplied for {} nodes", weights.len(), n),
        });
    }
    if weights.iter().any(|weight| !weight.is_finite()) {
        return Err(MorseError::MalformedGraph {
            reason: "node weights must be finite".to_string(),
        });
    }
    for node in 0..n {
        if *graph.key(node) != node {
            return Err(MorseError::MalformedGraph {
                reason: format!("node {node} is keyed {} instead of its index", graph.key(node)),
            });
        }
    }
    let analysis = graph.analyze();
    if analysis.genuine_count() != 1 || analysis.clusters()[0].len() != n {
        return Err(MorseError::MalformedGraph {
            reason: "graph is not a single strongly connected component".to_string(),
        });
    }
    Ok(())
}

/// Minimum average node weight around any cycle of `graph`.
///
/// `row_cap` bounds the number of distance rows computed; a capped run only
/// sees cycles up to that length and fails with [`MorseError::NoReachableCycle`]
/// when every cycle is longer.
pub fn minimum_mean_cycle(
    graph: &DiGraph<usize>,
    weights: &[f64],
    row_cap: Option<usize>,
) -> Result<f64, MorseError> {
    ensure_well_formed(graph, weights)?;
    if row_cap == Some(0) {
        return Err(MorseError::MalformedGraph {
            reason: "row cap must be at least one".to_string(),
        });
    }
    let k = graph.node_count();
    let rows = row_cap.map_or(k, |cap| cap.min(k));

    let mut distance = vec![vec![SENTINEL; k]; rows + 1];
    distance[0][0] = 0.0;
    for i in 0..rows {
        for from in 0..k {
            let d = distance[i][from];
            if is_unreachable(d) {
                continue;
            }
            for &to in graph.neighbours(from) {
                let candidate = d + weights[to];
                if candidate < distance[i + 1][to] {
                    distance[i + 1][to] = candidate;
                }
            }
        }
    }

    // rows unreachable in their entirety form a suffix of the table, since
    // row i + 1 is derived from row i alone
    let unreachable_rows = (1..=rows)
        .filter(|&i| distance[i].iter().all(|&d| is_unreachable(d)))
        .count();
    let last_row = rows - unreachable_rows;
    if last_row == 0 {
        return Err(MorseError::NoReachableCycle);
    }

    let mut best: Option<f64> = None;
    for node in 0..k {
        let final_distance = distance[last_row][node];
        if is_unreachable(final_distance) {
            continue;
        }
        let mut worst: Option<f64> = None;
        for i in 0..last_row {
            let d = distance[i][node];
            if is_unreachable(d) {
                continue;
            }
            let mean = (final_distance - d) / ((last_row - i) as f64);
            worst = Some(match worst {
                Some(current) => current.max(mean),
                None => mean,
            });
        }
        if let Some(candidate) = worst {
            best = Some(match best {
                Some(current) => current.min(candidate),
                None => candidate,
            });
        }
    }
    debug!(nodes = k, rows, last_row, "mean cycle table evaluated");
    best.ok_or(MorseError::NoReachableCycle)
}

/// Maximum average node weight around any cycle of `graph`, computed as the
/// negated minimum over negated weights.
pub fn maximum_mean_cycle(
    graph: &DiGraph<usize>,
    weights: &[f64],
    row_cap: Option<usize>,
) -> Result<f64, MorseError> {
    let negated: Vec<f64> = weights.iter().map(|weight| -weight).collect();
    minimum_mean_cycle(graph, &negated, row_cap).map(|mean| -mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> DiGraph<usize> {
        let mut graph = DiGraph::new();
        for node in 0..n {
            graph.add_node(node);
        }
        for node in 0..n {
            graph.add_edge(node, (node + 1) % n);
        }
        graph
    }

    #[test]
    fn uniform_ring_has_mean_weight_one() {
        let graph = ring(6);
        let weights = vec![1.0; 6];
        let minimum = minimum_mean_cycle(&graph, &weights, None).expect("well-formed ring");
        let maximum = maximum_mean_cycle(&graph, &weights, None).expect("well-formed ring");
        assert!((minimum - 1.0).abs() < 1e-9);
        assert!((maximum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn competing_cycles_separate_the_extremes() {
        // cycles 0-1 (mean 1) and 1-2 (mean 3) share node 1
        let mut graph = DiGraph::new();
        for node in 0..3 {
            graph.add_node(node);
        }
        graph.add_edge(0, 1);
        graph.add_edge(1, 0);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        let weights = vec![1.0, 1.0, 5.0];
        let minimum = minimum_mean_cycle(&graph, &weights, None).expect("well-formed graph");
        let maximum = maximum_mean_cycle(&graph, &weights, None).expect("well-formed graph");
        assert!((minimum - 1.0).abs() < 1e-9);
        assert!((maximum - 3.0).abs() < 1e-9);
    }

    #[test]
    fn alternating_weights_cancel_around_an_even_ring() {
        let graph = ring(4);
        let weights = crate::weighting::alternating_weights(4);
        let minimum = minimum_mean_cycle(&graph, &weights, None).expect("well-formed ring");
        let maximum = maximum_mean_cycle(&graph, &weights, None).expect("well-formed ring");
        assert!(minimum.abs() < 1e-9);
        assert!(maximum.abs() < 1e-9);
    }

    #[test]
    fn a_self_loop_is_the_shortest_cycle() {
        let mut graph = DiGraph::new();
        graph.add_node(0);
        graph.add_edge(0, 0);
        let mean = minimum_mean_cycle(&graph, &[-2.5], None).expect("well-formed loop");
        assert!((mean + 2.5).abs() < 1e-9);
    }

    #[test]
    fn graphs_that_are_not_one_component_are_rejected() {
        let mut graph = DiGraph::new();
        graph.add_node(0);
        graph.add_node(1);
        graph.add_edge(0, 1);
        assert!(matches!(
            minimum_mean_cycle(&graph, &[1.0, 1.0], None),
            Err(MorseError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn empty_graphs_and_bad_weight_tables_are_rejected() {
        let empty: DiGraph<usize> = DiGraph::new();
        assert!(matches!(
            minimum_mean_cycle(&empty, &[], None),
            Err(MorseError::MalformedGraph { .. })
        ));
        let graph = ring(3);
        assert!(matches!(
            minimum_mean_cycle(&graph, &[1.0, 1.0], None),
            Err(MorseError::MalformedGraph { .. })
        ));
        assert!(matches!(
            minimum_mean_cycle(&graph, &[1.0, f64::NAN, 1.0], None),
            Err(MorseError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn non_contiguous_keys_are_rejected() {
        let mut graph = DiGraph::new();
        graph.add_node(5);
        graph.add_edge(0, 0);
        assert!(matches!(
            minimum_mean_cycle(&graph, &[1.0], None),
            Err(MorseError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn a_row_cap_below_the_cycle_length_finds_nothing() {
        let graph = ring(4);
        let weights = vec![1.0; 4];
        assert!(matches!(
            minimum_mean_cycle(&graph, &weights, Some(2)),
            Err(MorseError::NoReachableCycle)
        ));
        let capped = minimum_mean_cycle(&graph, &weights, Some(4)).expect("cap covers the ring");
        assert!((capped - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_row_caps_are_rejected() {
        let graph = ring(2);
        assert!(matches!(
            minimum_mean_cycle(&graph, &[1.0, 1.0], Some(0)),
            Err(MorseError::MalformedGraph { .. })
        ));
    }
}
