use thiserror::Error;

/// Typed failures surfaced across the library's API boundaries.
///
/// Every variant is local and recoverable: the orchestration loop degrades
/// (skips a sample, a cluster, or a round) instead of aborting the run.
#[derive(Debug, Error)]
pub enum MorseError {
    /// Subdivision was requested on a cell that already has children.
    #[error("cell {path} is already subdivided")]
    AlreadySubdivided { path: String },

    /// Subdivision was requested with a shape that creates fewer than two
    /// child cells.
    #[error("subdivision into a {nx}x{ny} grid does not refine the cell")]
    DegenerateSubdivision { nx: u32, ny: u32 },

    /// Mean-cycle analysis was requested on a graph that is not a single
    /// strongly connected component with contiguously numbered nodes.
    #[error("mean-cycle graph is not well-formed: {reason}")]
    MalformedGraph { reason: String },

    /// The mean-cycle distance table contains no finite cycle estimate,
    /// e.g. because a row cap cut the table short of every cycle length.
    #[error("no reachable cycle in mean-cycle analysis")]
    NoReachableCycle,
}
