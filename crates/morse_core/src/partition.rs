//! Recursive rectangular partition of the sampling domain.
//!
//! The tree starts as one rectangle split into an initial grid and is
//! refined by subdividing leaves. Leaves carry an active/discarded status
//! plus annotations written back by the graph analyses; internal cells
//! only route lookups down to their children.

use std::fmt;

use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MorseError;

/// Hierarchical address of a cell: the child indices walked from the root.
/// Structural equality makes paths usable as graph keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPath(Vec<u32>);

impl CellPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extends the path by one child index.
    pub fn child(&self, index: u32) -> Self {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for CellPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Whether a leaf still participates in the approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellStatus {
    Active,
    Discarded,
}

#[derive(Debug, Clone)]
enum CellKind {
    Leaf {
        status: CellStatus,
        colour: Option<usize>,
        elevation: Option<f64>,
    },
    Internal {
        children: Vec<CellArea>,
    },
}

/// A rectangular cell of the partition tree.
///
/// A cell is either a childless leaf with grid shape 1x1 or an internal
/// cell split into `cells_x * cells_y` children covering it exactly.
#[derive(Debug, Clone)]
pub struct CellArea {
    start_x: f64,
    start_y: f64,
    finish_x: f64,
    finish_y: f64,
    cells_x: u32,
    cells_y: u32,
    cell_width: f64,
    cell_height: f64,
    path: CellPath,
    kind: CellKind,
}

impl CellArea {
    /// Builds the root cell over the given bounds, immediately split into
    /// an initial `cells_x` by `cells_y` grid. A 1x1 grid keeps the root
    /// itself as the sole leaf.
    pub fn new(
        start_x: f64,
        start_y: f64,
        finish_x: f64,
        finish_y: f64,
        cells_x: u32,
        cells_y: u32,
    ) -> Result<Self> {
        if !start_x.is_finite() || !start_y.is_finite() || !finish_x.is_finite() || !finish_y.is_finite() {
            bail!("Domain bounds must be finite.");
        }
        if finish_x <= start_x || finish_y <= start_y {
            bail!("Domain must satisfy finish > start on each axis.");
        }
        if cells_x == 0 || cells_y == 0 {
            bail!("Initial grid must be at least 1x1.");
        }
        Ok(Self::with_path(
            start_x,
            start_y,
            finish_x,
            finish_y,
            cells_x,
            cells_y,
            CellPath::root(),
        ))
    }

    fn with_path(
        start_x: f64,
        start_y: f64,
        finish_x: f64,
        finish_y: f64,
        cells_x: u32,
        cells_y: u32,
        path: CellPath,
    ) -> Self {
        let mut cell = Self {
            start_x,
            start_y,
            finish_x,
            finish_y,
            cells_x,
            cells_y,
            cell_width: (finish_x - start_x) / f64::from(cells_x),
            cell_height: (finish_y - start_y) / f64::from(cells_y),
            path,
            kind: CellKind::Leaf {
                status: CellStatus::Active,
                colour: None,
                elevation: None,
            },
        };
        if cells_x != 1 || cells_y != 1 {
            cell.kind = CellKind::Internal {
                children: cell.build_children(),
            };
        }
        cell
    }

    fn build_children(&self) -> Vec<CellArea> {
        let mut children = Vec::with_capacity(self.cells_x as usize * self.cells_y as usize);
        for j in 0..self.cells_y {
            for i in 0..self.cells_x {
                // row j = 0 is the top row, so it sits cells_y - 1 cell
                // heights above the bottom edge
                let child_start_x = self.start_x + f64::from(i) * self.cell_width;
                let child_start_y = self.start_y + f64::from(self.cells_y - j - 1) * self.cell_height;
                let child_finish_x = self.start_x + f64::from(i + 1) * self.cell_width;
                let child_finish_y = self.start_y + f64::from(self.cells_y - j) * self.cell_height;
                children.push(Self::with_path(
                    child_start_x,
                    child_start_y,
                    child_finish_x,
                    child_finish_y,
                    1,
                    1,
                    self.path.child(j * self.cells_x + i),
                ));
            }
        }
        children
    }

    pub fn start_x(&self) -> f64 {
        self.start_x
    }

    pub fn start_y(&self) -> f64 {
        self.start_y
    }

    pub fn finish_x(&self) -> f64 {
        self.finish_x
    }

    pub fn finish_y(&self) -> f64 {
        self.finish_y
    }

    pub fn cells_x(&self) -> u32 {
        self.cells_x
    }

    pub fn cells_y(&self) -> u32 {
        self.cells_y
    }

    pub fn path(&self) -> &CellPath {
        &self.path
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, CellKind::Leaf { .. })
    }

    /// Children in grid order; empty for a leaf.
    pub fn children(&self) -> &[CellArea] {
        match &self.kind {
            CellKind::Internal { children } => children,
            CellKind::Leaf { .. } => &[],
        }
    }

    /// Status of a leaf; internal cells carry none.
    pub fn status(&self) -> Option<CellStatus> {
        match self.kind {
            CellKind::Leaf { status, .. } => Some(status),
            CellKind::Internal { .. } => None,
        }
    }

    pub fn colour(&self) -> Option<usize> {
        match self.kind {
            CellKind::Leaf { colour, .. } => colour,
            CellKind::Internal { .. } => None,
        }
    }

    pub fn elevation(&self) -> Option<f64> {
        match self.kind {
            CellKind::Leaf { elevation, .. } => elevation,
            CellKind::Internal { .. } => None,
        }
    }

    pub fn midpoint(&self) -> (f64, f64) {
        (
            (self.start_x + self.finish_x) / 2.0,
            (self.start_y + self.finish_y) / 2.0,
        )
    }

    /// Both bounds are inclusive, so points on the outer edges still count
    /// as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.start_x && x <= self.finish_x && y >= self.start_y && y <= self.finish_y
    }

    /// Grid index of the child cell containing `(x, y)`, numbering cells
    /// left to right with the top row first:
    ///
    /// ```text
    /// | 0 | 1 | 2 |
    /// | 3 | 4 | 5 |
    /// ```
    ///
    /// Points on the finish edges fall into the last column or row.
    /// Returns `None` when the point lies outside the cell's bounds.
    pub fn cell_index(&self, x: f64, y: f64) -> Option<usize> {
        if !self.contains(x, y) {
            warn!(x, y, "point outside cell bounds");
            return None;
        }
        let column = (((x - self.start_x) / self.cell_width).floor() as i64)
            .clamp(0, i64::from(self.cells_x) - 1) as usize;
        let row = (((y - self.start_y) / self.cell_height).floor() as i64)
            .clamp(0, i64::from(self.cells_y) - 1) as usize;
        Some((self.cells_y as usize - 1 - row) * self.cells_x as usize + column)
    }

    /// Number of leading path segments that resolve to children, with a
    /// mismatch warning when the walk stops early.
    fn resolvable_segments(&self, path: &CellPath) -> usize {
        let mut current = self;
        for (consumed, &segment) in path.segments().iter().enumerate() {
            match current.children().get(segment as usize) {
                Some(child) => current = child,
                None => {
                    if current.is_leaf() {
                        warn!(path = %path, "fragmentation ended before the path was consumed");
                    } else {
                        warn!(path = %path, segment, "path segment out of range");
                    }
                    return consumed;
                }
            }
        }
        path.depth()
    }

    /// Descends the tree consuming one path segment per level. If the
    /// fragmentation ends before the path does, the deepest reached cell
    /// is returned and a mismatch warning is logged.
    pub fn cell_by_path(&self, path: &CellPath) -> &CellArea {
        let valid = self.resolvable_segments(path);
        let mut current = self;
        for &segment in &path.segments()[..valid] {
            current = &current.children()[segment as usize];
        }
        current
    }

    pub fn cell_by_path_mut(&mut self, path: &CellPath) -> &mut CellArea {
        let valid = self.resolvable_segments(path);
        let mut current = self;
        for &segment in &path.segments()[..valid] {
            current = match &mut current.kind {
                CellKind::Internal { children } => &mut children[segment as usize],
                // `resolvable_segments` only counts segments that resolve
                // to children, so the walk never reaches a leaf here.
                CellKind::Leaf { .. } => unreachable!(),
            };
        }
        current
    }

    /// Walks down to the leaf containing `(x, y)`. The leaf is returned
    /// whatever its status; filtering is the caller's concern.
    pub fn cell_by_point(&self, x: f64, y: f64) -> Option<&CellArea> {
        let mut current = self;
        loop {
            let children = current.children();
            if children.is_empty() {
                return Some(current);
            }
            current = &children[current.cell_index(x, y)?];
        }
    }

    /// Splits a leaf into an `nx` by `ny` grid of fresh active leaves and
    /// returns their paths in grid order.
    pub fn subdivide(&mut self, nx: u32, ny: u32) -> Result<Vec<CellPath>, MorseError> {
        if !self.is_leaf() {
            return Err(MorseError::AlreadySubdivided {
                path: self.path.to_string(),
            });
        }
        if nx == 0 || ny == 0 || (nx == 1 && ny == 1) {
            return Err(MorseError::DegenerateSubdivision { nx, ny });
        }
        self.cells_x = nx;
        self.cells_y = ny;
        self.cell_width = (self.finish_x - self.start_x) / f64::from(nx);
        self.cell_height = (self.finish_y - self.start_y) / f64::from(ny);
        let children = self.build_children();
        let paths = children.iter().map(|child| child.path.clone()).collect();
        self.kind = CellKind::Internal { children };
        Ok(paths)
    }

    /// Draws `amount` uniform points inside every active leaf of this
    /// subtree, appending them to `out` in leaf order. `margin` widens each
    /// leaf's box by that fraction of its extent on every side before
    /// drawing; discarded leaves contribute nothing.
    pub fn random_points(
        &self,
        amount: usize,
        margin: f64,
        rng: &mut impl Rng,
        out: &mut Vec<(f64, f64)>,
    ) {
        let margin = margin.max(0.0);
        let mut stack = vec![self];
        while let Some(cell) = stack.pop() {
            match &cell.kind {
                CellKind::Leaf {
                    status: CellStatus::Active,
                    ..
                } => {
                    let delta_x = (cell.finish_x - cell.start_x) * margin;
                    let delta_y = (cell.finish_y - cell.start_y) * margin;
                    for _ in 0..amount {
                        let x = rng.random_range(cell.start_x - delta_x..cell.finish_x + delta_x);
                        let y = rng.random_range(cell.start_y - delta_y..cell.finish_y + delta_y);
                        out.push((x, y));
                    }
                }
                CellKind::Leaf { .. } => {}
                CellKind::Internal { children } => stack.extend(children.iter().rev()),
            }
        }
    }

    /// Collects the active leaves of this subtree in tree order.
    pub fn active_leaves(&self) -> Vec<&CellArea> {
        let mut leaves = Vec::new();
        let mut stack = vec![self];
        while let Some(cell) = stack.pop() {
            match &cell.kind {
                CellKind::Leaf {
                    status: CellStatus::Active,
                    ..
                } => leaves.push(cell),
                CellKind::Leaf { .. } => {}
                CellKind::Internal { children } => stack.extend(children.iter().rev()),
            }
        }
        leaves
    }

    pub fn active_leaf_paths(&self) -> Vec<CellPath> {
        self.active_leaves()
            .into_iter()
            .map(|leaf| leaf.path.clone())
            .collect()
    }

    pub fn active_leaf_count(&self) -> usize {
        self.active_leaves().len()
    }

    /// Marks the leaf at `path` as discarded; internal cells are left
    /// untouched.
    pub fn mark_discarded(&mut self, path: &CellPath) {
        match &mut self.cell_by_path_mut(path).kind {
            CellKind::Leaf { status, .. } => *status = CellStatus::Discarded,
            CellKind::Internal { .. } => warn!(path = %path, "cannot discard an internal cell"),
        }
    }

    /// Tags the leaf at `path` with a component colour.
    pub fn mark_colour(&mut self, path: &CellPath, value: usize) {
        match &mut self.cell_by_path_mut(path).kind {
            CellKind::Leaf { colour, .. } => *colour = Some(value),
            CellKind::Internal { .. } => warn!(path = %path, "cannot colour an internal cell"),
        }
    }

    /// Tags the leaf at `path` with an elevation.
    pub fn mark_elevation(&mut self, path: &CellPath, value: f64) {
        match &mut self.cell_by_path_mut(path).kind {
            CellKind::Leaf { elevation, .. } => *elevation = Some(value),
            CellKind::Internal { .. } => warn!(path = %path, "cannot elevate an internal cell"),
        }
    }
}
