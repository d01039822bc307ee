//! Insertion-ordered directed graph and the strongly-connected-component
//! machinery used to prune symbolic images.
//!
//! Node identity is structural: re-adding a key returns the node it was
//! first given, so iteration over nodes always follows insertion order.
//! Traversals run on explicit stacks so deep graphs cannot exhaust the
//! call stack.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

/// Index of a node within a [`DiGraph`], stable for the graph's lifetime.
pub type NodeId = usize;

const UNVISITED: usize = usize::MAX;

struct DfsFrame {
    node: NodeId,
    edge: usize,
}

#[derive(Debug, Clone)]
pub struct DiGraph<K> {
    keys: Vec<K>,
    index: HashMap<K, NodeId>,
    adjacency: Vec<Vec<NodeId>>,
}

impl<K> Default for DiGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> DiGraph<K> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.keys.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn key(&self, node: NodeId) -> &K {
        &self.keys[node]
    }

    pub fn neighbours(&self, node: NodeId) -> &[NodeId] {
        &self.adjacency[node]
    }

    /// Appends a directed edge; duplicates are tolerated.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.adjacency[from].push(to);
    }

    fn has_self_loop(&self, node: NodeId) -> bool {
        self.adjacency[node].contains(&node)
    }

    /// Tarjan's algorithm over the insertion-ordered node set, with the
    /// recursion replaced by an explicit frame stack that preserves the
    /// recursive index-assignment order.
    pub fn analyze(&self) -> SccAnalysis {
        let n = self.node_count();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<NodeId> = Vec::new();
        let mut next_index = 0usize;
        let mut genuine: Vec<Vec<NodeId>> = Vec::new();
        let mut transient: Vec<NodeId> = Vec::new();

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut frames = vec![DfsFrame { node: root, edge: 0 }];
            while !frames.is_empty() {
                let top = frames.len() - 1;
                let v = frames[top].node;
                if frames[top].edge < self.adjacency[v].len() {
                    let w = self.adjacency[v][frames[top].edge];
                    frames[top].edge += 1;
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push(DfsFrame { node: w, edge: 0 });
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                } else {
                    frames.pop();
                    if let Some(parent) = frames.last() {
                        lowlink[parent.node] = lowlink[parent.node].min(lowlink[v]);
                    }
                    if lowlink[v] == index[v] {
                        let mut members = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            members.push(w);
                            if w == v {
                                break;
                            }
                        }
                        if members.len() > 1 || self.has_self_loop(v) {
                            genuine.push(members);
                        } else {
                            transient.push(v);
                        }
                    }
                }
            }
        }

        let genuine_count = genuine.len();
        let mut clusters = genuine;
        clusters.extend(transient.into_iter().map(|node| vec![node]));
        let mut cluster_of = vec![0usize; n];
        for (cluster, members) in clusters.iter().enumerate() {
            for &node in members {
                cluster_of[node] = cluster;
            }
        }
        debug!(
            nodes = n,
            clusters = clusters.len(),
            genuine = genuine_count,
            "component analysis complete"
        );
        SccAnalysis {
            clusters,
            genuine_count,
            cluster_of,
        }
    }

    /// Builds the cluster graph: one node per cluster keyed by its index
    /// and one edge per ordered pair of distinct clusters joined by at
    /// least one member edge. Dropping intra-cluster edges leaves the
    /// result acyclic.
    pub fn condensation(&self, analysis: &SccAnalysis) -> DiGraph<usize> {
        let mut condensed = DiGraph::new();
        for cluster in 0..analysis.cluster_count() {
            condensed.add_node(cluster);
        }
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for from in 0..self.node_count() {
            let from_cluster = analysis.cluster_of(from);
            for &to in &self.adjacency[from] {
                let to_cluster = analysis.cluster_of(to);
                if from_cluster != to_cluster && seen.insert((from_cluster, to_cluster)) {
                    condensed.add_edge(from_cluster, to_cluster);
                }
            }
        }
        condensed
    }

    /// Post-order depth-first traversal from every root in insertion
    /// order. On an acyclic graph the result is a reverse topological
    /// order: every node appears before all of its predecessors.
    pub fn reverse_topological_order(&self) -> Vec<NodeId> {
        let n = self.node_count();
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut frames: Vec<DfsFrame> = Vec::new();
        for root in 0..n {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            frames.push(DfsFrame { node: root, edge: 0 });
            while !frames.is_empty() {
                let top = frames.len() - 1;
                let v = frames[top].node;
                if frames[top].edge < self.adjacency[v].len() {
                    let w = self.adjacency[v][frames[top].edge];
                    frames[top].edge += 1;
                    if !visited[w] {
                        visited[w] = true;
                        frames.push(DfsFrame { node: w, edge: 0 });
                    }
                } else {
                    frames.pop();
                    order.push(v);
                }
            }
        }
        order
    }
}

impl<K: Eq + Hash + Clone> DiGraph<K> {
    /// Registers `key` and returns its node id; re-adding an existing key
    /// returns the id it was first given.
    pub fn add_node(&mut self, key: K) -> NodeId {
        if let Some(&node) = self.index.get(&key) {
            return node;
        }
        let node = self.keys.len();
        self.index.insert(key.clone(), node);
        self.keys.push(key);
        self.adjacency.push(Vec::new());
        node
    }

    pub fn node_id(&self, key: &K) -> Option<NodeId> {
        self.index.get(key).copied()
    }
}

/// Result of one component analysis over one graph instance.
///
/// Clusters are ordered with the genuine recurrent components first:
/// positions `[0, genuine_count)` hold components of size greater than one
/// or single nodes with a self-loop, and every remaining node follows as
/// its own transient singleton. A self-looped singleton counts as genuine
/// because samples returning to their own cell are direct recurrence
/// evidence.
#[derive(Debug, Clone)]
pub struct SccAnalysis {
    clusters: Vec<Vec<NodeId>>,
    genuine_count: usize,
    cluster_of: Vec<usize>,
}

impl SccAnalysis {
    pub fn clusters(&self) -> &[Vec<NodeId>] {
        &self.clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn genuine_count(&self) -> usize {
        self.genuine_count
    }

    pub fn genuine_clusters(&self) -> &[Vec<NodeId>] {
        &self.clusters[..self.genuine_count]
    }

    pub fn cluster_of(&self, node: NodeId) -> usize {
        self.cluster_of[node]
    }

    pub fn is_genuine(&self, cluster: usize) -> bool {
        cluster < self.genuine_count
    }

    /// Nodes outside every genuine component, i.e. the pruning candidates.
    pub fn transient_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.clusters[self.genuine_count..]
            .iter()
            .flatten()
            .copied()
    }
}
