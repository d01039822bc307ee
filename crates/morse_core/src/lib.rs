pub mod builder;
pub mod cycles;
pub mod error;
pub mod graph;
pub mod maps;
pub mod orbit;
/// The `morse_core` crate approximates the chain-recurrent set of a planar
/// discrete map with the subdivision method over symbolic images.
///
/// Key components:
/// - **Partition**: recursive rectangular decomposition of the domain with
///   per-leaf status and render annotations (`partition`).
/// - **Graph engine**: insertion-ordered digraph, Tarjan component analysis,
///   condensation and extremal mean cycles (`graph`, `cycles`).
/// - **Builder**: the sampling / pruning loop and the public entry points
///   (`builder`); per-node weights for the elevation flow live in
///   `weighting`.
pub mod partition;
pub mod traits;
pub mod weighting;
