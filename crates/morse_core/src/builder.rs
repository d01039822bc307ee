//! The subdivision loop and the public entry points built on it.
//!
//! Each round samples every cell of the current fragmentation, records
//! where the map sends the samples as a directed graph over cell paths,
//! and discards the cells that no recurrent component passes through.
//! Surviving cells are then rendered as point clouds, optionally tagged
//! with a component colour or an expansion-flow elevation.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cycles::maximum_mean_cycle;
use crate::graph::{DiGraph, NodeId, SccAnalysis};
use crate::partition::{CellArea, CellPath, CellStatus};
use crate::traits::PlanarMap;
use crate::weighting::expansion_rate;

/// Configuration for one approximation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdivisionSettings {
    /// Domain bounds; finish must exceed start on each axis.
    pub start_x: f64,
    pub start_y: f64,
    pub finish_x: f64,
    pub finish_y: f64,
    /// Shape of the first-level grid.
    pub initial_cells_x: u32,
    pub initial_cells_y: u32,
    /// Regular fragmentation rounds run after the initial pass.
    pub depth: u32,
    /// Random samples drawn per cell when building each round's symbolic
    /// image.
    pub samples_per_cell: usize,
    /// Random samples drawn per surviving cell for the rendered output.
    pub render_samples_per_cell: usize,
    /// Optional cap on the distance rows computed by the elevation flow;
    /// capped runs only see cycles up to that length.
    pub flow_row_cap: Option<usize>,
    /// Seed for the sampling generator; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SubdivisionSettings {
    fn default() -> Self {
        Self {
            start_x: -1.5,
            start_y: -1.0,
            finish_x: 1.5,
            finish_y: 1.0,
            initial_cells_x: 40,
            initial_cells_y: 40,
            depth: 2,
            samples_per_cell: 100,
            render_samples_per_cell: 15,
            flow_row_cap: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColouredPoint {
    pub x: f64,
    pub y: f64,
    pub colour: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfacePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Point cloud over the cells surviving every pruning round.
#[derive(Debug, Clone, Serialize)]
pub struct RecurrentSet {
    pub points: Vec<PlanePoint>,
    pub rounds: u32,
    pub surviving_cells: usize,
}

/// Recurrent components coloured by their rank in reverse topological
/// order over the final condensation graph.
#[derive(Debug, Clone, Serialize)]
pub struct MorseDecomposition {
    pub points: Vec<ColouredPoint>,
    pub component_count: usize,
    pub rounds: u32,
    pub surviving_cells: usize,
}

/// Surviving cells lifted by their component's extremal expansion flow.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionSurface {
    pub points: Vec<SurfacePoint>,
    pub component_count: usize,
    pub rounds: u32,
    pub surviving_cells: usize,
}

/// Approximates the chain-recurrent set of `map` over the configured
/// domain, returning a render-ready point cloud.
pub fn chain_recurrent_set(
    map: &impl PlanarMap,
    settings: &SubdivisionSettings,
) -> Result<RecurrentSet> {
    validate_settings(settings)?;
    let mut rng = make_rng(settings.seed);
    let outcome = run_rounds(map, settings, &mut rng)?;
    let mut raw = Vec::new();
    outcome
        .partition
        .random_points(settings.render_samples_per_cell, 0.0, &mut rng, &mut raw);
    Ok(RecurrentSet {
        points: raw.into_iter().map(|(x, y)| PlanePoint { x, y }).collect(),
        rounds: settings.depth + 1,
        surviving_cells: outcome.partition.active_leaf_count(),
    })
}

/// Approximates the chain-recurrent set and colours each surviving cell by
/// the topological rank of its recurrent component.
pub fn morse_decomposition(
    map: &impl PlanarMap,
    settings: &SubdivisionSettings,
) -> Result<MorseDecomposition> {
    validate_settings(settings)?;
    let mut rng = make_rng(settings.seed);
    let mut outcome = run_rounds(map, settings, &mut rng)?;
    assign_colours(&mut outcome.partition, &outcome.graph, &outcome.analysis);
    let points = render_coloured(
        &outcome.partition,
        settings.render_samples_per_cell,
        &mut rng,
    );
    Ok(MorseDecomposition {
        points,
        component_count: outcome.analysis.genuine_count(),
        rounds: settings.depth + 1,
        surviving_cells: outcome.partition.active_leaf_count(),
    })
}

/// Approximates the chain-recurrent set and lifts each surviving cell to
/// the maximum mean expansion rate over its component's cycles.
pub fn expansion_surface(
    map: &impl PlanarMap,
    settings: &SubdivisionSettings,
) -> Result<ExpansionSurface> {
    validate_settings(settings)?;
    let mut rng = make_rng(settings.seed);
    let mut outcome = run_rounds(map, settings, &mut rng)?;
    assign_elevations(
        map,
        &mut outcome.partition,
        &outcome.graph,
        &outcome.analysis,
        settings.flow_row_cap,
    );
    let points = render_surface(
        &outcome.partition,
        settings.render_samples_per_cell,
        &mut rng,
    );
    Ok(ExpansionSurface {
        points,
        component_count: outcome.analysis.genuine_count(),
        rounds: settings.depth + 1,
        surviving_cells: outcome.partition.active_leaf_count(),
    })
}

fn validate_settings(settings: &SubdivisionSettings) -> Result<()> {
    if !settings.start_x.is_finite()
        || !settings.start_y.is_finite()
        || !settings.finish_x.is_finite()
        || !settings.finish_y.is_finite()
    {
        bail!("Domain bounds must be finite.");
    }
    if settings.finish_x <= settings.start_x || settings.finish_y <= settings.start_y {
        bail!("Domain must satisfy finish > start on each axis.");
    }
    if settings.initial_cells_x == 0 || settings.initial_cells_y == 0 {
        bail!("Initial grid must be at least 1x1.");
    }
    if settings.samples_per_cell == 0 {
        bail!("samples_per_cell must be at least 1.");
    }
    if settings.render_samples_per_cell == 0 {
        bail!("render_samples_per_cell must be at least 1.");
    }
    if settings.flow_row_cap == Some(0) {
        bail!("flow_row_cap must be at least 1 when set.");
    }
    Ok(())
}

fn make_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    }
}

struct RoundOutcome {
    partition: CellArea,
    graph: DiGraph<CellPath>,
    analysis: SccAnalysis,
}

/// Runs the initial pass over the first-level grid plus `depth` regular
/// rounds, returning the refined partition together with the final round's
/// symbolic image and its component analysis.
fn run_rounds(
    map: &impl PlanarMap,
    settings: &SubdivisionSettings,
    rng: &mut SmallRng,
) -> Result<RoundOutcome> {
    let mut partition = CellArea::new(
        settings.start_x,
        settings.start_y,
        settings.finish_x,
        settings.finish_y,
        settings.initial_cells_x,
        settings.initial_cells_y,
    )?;
    let first_level = partition.active_leaf_paths();
    let (mut graph, mut analysis) = run_round(
        map,
        &mut partition,
        first_level,
        settings.samples_per_cell,
        rng,
        0,
    );
    for round in 1..=settings.depth {
        let mut created = Vec::new();
        for path in partition.active_leaf_paths() {
            created.extend(partition.cell_by_path_mut(&path).subdivide(2, 2)?);
        }
        let (next_graph, next_analysis) = run_round(
            map,
            &mut partition,
            created,
            settings.samples_per_cell,
            rng,
            round,
        );
        graph = next_graph;
        analysis = next_analysis;
    }
    Ok(RoundOutcome {
        partition,
        graph,
        analysis,
    })
}

/// One sampling / analysis / pruning pass over the given node cells.
fn run_round(
    map: &impl PlanarMap,
    partition: &mut CellArea,
    node_paths: Vec<CellPath>,
    samples_per_cell: usize,
    rng: &mut SmallRng,
    round: u32,
) -> (DiGraph<CellPath>, SccAnalysis) {
    let mut graph = DiGraph::new();
    for path in node_paths {
        graph.add_node(path);
    }
    fill_symbolic_image(map, partition, &mut graph, samples_per_cell, rng);
    let analysis = graph.analyze();
    let mut discarded = 0usize;
    for node in analysis.transient_nodes() {
        partition.mark_discarded(graph.key(node));
        discarded += 1;
    }
    info!(
        round,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        components = analysis.genuine_count(),
        discarded,
        "fragmentation round analyzed"
    );
    (graph, analysis)
}

/// Samples every registered cell and records where the map sends the
/// samples. Images that leave the domain or land in a discarded cell are
/// dropped individually; edges are deduplicated per source cell.
fn fill_symbolic_image(
    map: &impl PlanarMap,
    partition: &CellArea,
    graph: &mut DiGraph<CellPath>,
    samples_per_cell: usize,
    rng: &mut SmallRng,
) {
    let mut samples = Vec::with_capacity(samples_per_cell);
    let mut seen: HashSet<NodeId> = HashSet::new();
    for from in 0..graph.node_count() {
        samples.clear();
        seen.clear();
        partition
            .cell_by_path(graph.key(from))
            .random_points(samples_per_cell, 0.0, rng, &mut samples);
        for &(x, y) in &samples {
            let (image_x, image_y) = map.apply(x, y);
            if !partition.contains(image_x, image_y) {
                continue;
            }
            let destination = match partition.cell_by_point(image_x, image_y) {
                Some(leaf) => leaf,
                None => continue,
            };
            if destination.status() == Some(CellStatus::Discarded) {
                continue;
            }
            let to = match graph.node_id(destination.path()) {
                Some(node) => node,
                None => {
                    debug!(path = %destination.path(), "image landed outside the round's cells");
                    continue;
                }
            };
            if seen.insert(to) {
                graph.add_edge(from, to);
            }
        }
    }
}

/// Colours every member of every genuine component with the component's
/// rank in reverse topological order over the condensation graph.
fn assign_colours(partition: &mut CellArea, graph: &DiGraph<CellPath>, analysis: &SccAnalysis) {
    let condensed = graph.condensation(analysis);
    let order = condensed.reverse_topological_order();
    let mut rank_of: HashMap<usize, usize> = HashMap::new();
    for node in order {
        let cluster = *condensed.key(node);
        if analysis.is_genuine(cluster) {
            let rank = rank_of.len();
            rank_of.insert(cluster, rank);
        }
    }
    for (cluster, members) in analysis.genuine_clusters().iter().enumerate() {
        if let Some(&rank) = rank_of.get(&cluster) {
            for &member in members {
                partition.mark_colour(graph.key(member), rank);
            }
        }
    }
}

/// Lifts every member of every genuine component to the component's
/// maximum mean expansion rate. A component whose flow cannot be computed
/// is skipped and its cells keep no elevation.
fn assign_elevations(
    map: &impl PlanarMap,
    partition: &mut CellArea,
    graph: &DiGraph<CellPath>,
    analysis: &SccAnalysis,
    row_cap: Option<usize>,
) {
    for (cluster, members) in analysis.genuine_clusters().iter().enumerate() {
        let (subgraph, paths) = restrict_to_cluster(graph, members);
        let weights: Vec<f64> = paths
            .iter()
            .map(|path| {
                let (x, y) = partition.cell_by_path(path).midpoint();
                expansion_rate(map, x, y)
            })
            .collect();
        match maximum_mean_cycle(&subgraph, &weights, row_cap) {
            Ok(flow) => {
                debug!(cluster, flow, members = paths.len(), "component elevation computed");
                for path in &paths {
                    partition.mark_elevation(path, flow);
                }
            }
            Err(error) => {
                warn!(cluster, %error, "skipping elevation for component");
            }
        }
    }
}

/// Restriction of `graph` to one component, renumbered so node keys equal
/// their own indices.
fn restrict_to_cluster(
    graph: &DiGraph<CellPath>,
    members: &[NodeId],
) -> (DiGraph<usize>, Vec<CellPath>) {
    let mut local_of: HashMap<NodeId, usize> = HashMap::new();
    let mut subgraph = DiGraph::new();
    let mut paths = Vec::with_capacity(members.len());
    for (local, &member) in members.iter().enumerate() {
        local_of.insert(member, local);
        subgraph.add_node(local);
        paths.push(graph.key(member).clone());
    }
    for (local, &member) in members.iter().enumerate() {
        for &target in graph.neighbours(member) {
            if let Some(&local_target) = local_of.get(&target) {
                subgraph.add_edge(local, local_target);
            }
        }
    }
    (subgraph, paths)
}

fn render_coloured(
    partition: &CellArea,
    samples_per_cell: usize,
    rng: &mut SmallRng,
) -> Vec<ColouredPoint> {
    let mut points = Vec::new();
    let mut scratch = Vec::with_capacity(samples_per_cell);
    for leaf in partition.active_leaves() {
        let colour = match leaf.colour() {
            Some(colour) => colour,
            None => {
                warn!(path = %leaf.path(), "active cell without a colour; skipping");
                continue;
            }
        };
        scratch.clear();
        leaf.random_points(samples_per_cell, 0.0, rng, &mut scratch);
        points.extend(scratch.iter().map(|&(x, y)| ColouredPoint { x, y, colour }));
    }
    points
}

fn render_surface(
    partition: &CellArea,
    samples_per_cell: usize,
    rng: &mut SmallRng,
) -> Vec<SurfacePoint> {
    let mut points = Vec::new();
    let mut scratch = Vec::with_capacity(samples_per_cell);
    for leaf in partition.active_leaves() {
        let z = match leaf.elevation() {
            Some(z) => z,
            None => continue,
        };
        scratch.clear();
        leaf.random_points(samples_per_cell, 0.0, rng, &mut scratch);
        points.extend(scratch.iter().map(|&(x, y)| SurfacePoint { x, y, z }));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::Henon;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn henon_settings(seed: u64) -> SubdivisionSettings {
        SubdivisionSettings {
            start_x: -2.0,
            start_y: -1.0,
            finish_x: 3.0,
            finish_y: 3.0,
            initial_cells_x: 5,
            initial_cells_y: 4,
            depth: 2,
            samples_per_cell: 100,
            render_samples_per_cell: 10,
            flow_row_cap: None,
            seed: Some(seed),
        }
    }

    #[test]
    fn default_settings_are_stable() {
        let settings = SubdivisionSettings::default();
        assert_eq!(settings.start_x, -1.5);
        assert_eq!(settings.finish_y, 1.0);
        assert_eq!(settings.initial_cells_x, 40);
        assert_eq!(settings.initial_cells_y, 40);
        assert_eq!(settings.depth, 2);
        assert_eq!(settings.samples_per_cell, 100);
        assert_eq!(settings.render_samples_per_cell, 15);
        assert_eq!(settings.flow_row_cap, None);
        assert_eq!(settings.seed, None);
    }

    #[test]
    fn settings_validation_rejects_bad_configurations() {
        let map = Henon::default();
        let mut settings = henon_settings(1);
        settings.finish_x = settings.start_x;
        assert_err_contains(chain_recurrent_set(&map, &settings), "finish > start");

        let mut settings = henon_settings(1);
        settings.initial_cells_y = 0;
        assert_err_contains(chain_recurrent_set(&map, &settings), "Initial grid");

        let mut settings = henon_settings(1);
        settings.samples_per_cell = 0;
        assert_err_contains(chain_recurrent_set(&map, &settings), "samples_per_cell");

        let mut settings = henon_settings(1);
        settings.render_samples_per_cell = 0;
        assert_err_contains(
            chain_recurrent_set(&map, &settings),
            "render_samples_per_cell",
        );

        let mut settings = henon_settings(1);
        settings.flow_row_cap = Some(0);
        assert_err_contains(chain_recurrent_set(&map, &settings), "flow_row_cap");

        let mut settings = henon_settings(1);
        settings.start_y = f64::INFINITY;
        assert_err_contains(chain_recurrent_set(&map, &settings), "finite");
    }

    #[test]
    fn transient_cells_are_discarded_but_the_attractor_survives() {
        let map = Henon::default();
        let result = chain_recurrent_set(&map, &henon_settings(42)).expect("henon run");
        assert_eq!(result.rounds, 3);
        assert!(result.surviving_cells > 0);
        // three rounds over a 5x4 grid can keep at most 320 leaves; the
        // attractor never fills the whole domain
        assert!(result.surviving_cells < 320);
        assert_eq!(
            result.points.len(),
            result.surviving_cells * henon_settings(42).render_samples_per_cell
        );
    }

    #[test]
    fn a_fixed_seed_reproduces_the_discard_set() {
        let map = Henon::default();
        let settings = henon_settings(7);
        let mut rng_a = make_rng(settings.seed);
        let first = run_rounds(&map, &settings, &mut rng_a).expect("henon run");
        let mut rng_b = make_rng(settings.seed);
        let second = run_rounds(&map, &settings, &mut rng_b).expect("henon run");
        assert_eq!(
            first.partition.active_leaf_paths(),
            second.partition.active_leaf_paths()
        );
        assert!(!first.partition.active_leaf_paths().is_empty());
    }

    #[test]
    fn every_rendered_point_stays_inside_the_domain() {
        let map = Henon::default();
        let settings = henon_settings(3);
        let result = chain_recurrent_set(&map, &settings).expect("henon run");
        assert!(result
            .points
            .iter()
            .all(|p| p.x >= settings.start_x
                && p.x <= settings.finish_x
                && p.y >= settings.start_y
                && p.y <= settings.finish_y));
    }

    #[test]
    fn decomposition_colours_rank_below_the_component_count() {
        let map = Henon::default();
        let result = morse_decomposition(&map, &henon_settings(11)).expect("henon run");
        assert!(result.component_count >= 1);
        assert!(!result.points.is_empty());
        assert!(result
            .points
            .iter()
            .all(|p| p.colour < result.component_count));
    }

    #[test]
    fn surface_heights_are_finite() {
        let map = Henon::default();
        let mut settings = henon_settings(19);
        settings.depth = 1;
        settings.samples_per_cell = 60;
        let result = expansion_surface(&map, &settings).expect("henon run");
        assert_eq!(result.rounds, 2);
        assert!(!result.points.is_empty());
        assert!(result.points.iter().all(|p| p.z.is_finite()));
    }

    #[test]
    fn an_identity_map_keeps_every_cell() {
        // every point is fixed, so every cell maps into itself and no cell
        // is ever discarded
        let identity = |x: f64, y: f64| (x, y);
        let settings = SubdivisionSettings {
            start_x: 0.0,
            start_y: 0.0,
            finish_x: 1.0,
            finish_y: 1.0,
            initial_cells_x: 2,
            initial_cells_y: 2,
            depth: 1,
            samples_per_cell: 20,
            render_samples_per_cell: 2,
            flow_row_cap: None,
            seed: Some(5),
        };
        let result = chain_recurrent_set(&identity, &settings).expect("identity run");
        assert_eq!(result.surviving_cells, 16);
    }

    #[test]
    fn an_escaping_map_discards_everything() {
        // all samples land far outside the domain, so no edges are ever
        // recorded and every cell is transient
        let escape = |x: f64, _y: f64| (x + 100.0, 100.0);
        let settings = SubdivisionSettings {
            start_x: 0.0,
            start_y: 0.0,
            finish_x: 1.0,
            finish_y: 1.0,
            initial_cells_x: 2,
            initial_cells_y: 2,
            depth: 1,
            samples_per_cell: 10,
            render_samples_per_cell: 2,
            flow_row_cap: None,
            seed: Some(5),
        };
        let result = chain_recurrent_set(&escape, &settings).expect("escape run");
        assert_eq!(result.surviving_cells, 0);
        assert!(result.points.is_empty());
    }
}
