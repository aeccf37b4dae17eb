//! Capability interfaces of the spatial cell decomposition.
//!
//! The kernel never constructs geometry itself; it consumes a cell system through these traits.

use std::fmt::Debug;
use std::hash::Hash;

/// Partition of the simulation box into cells.
pub trait Cells {
    /// Cell handle. `Ord` gives deterministic iteration over cell-keyed maps.
    type Cell: Copy + Eq + Ord + Hash + Debug;

    /// Cell containing `position`.
    fn position_to_cell(&self, position: &[f64]) -> Self::Cell;

    /// Every cell of the system, in a fixed order.
    fn cells(&self) -> Vec<Self::Cell>;

    /// Periodic-aware separation vector pointing from `from` to `to`.
    fn separation_vector(&self, from: &[f64], to: &[f64]) -> Vec<f64>;
}

/// Cell system with periodic boundaries, where cells can be expressed relative to each other.
///
/// Relative cells are cells again: `relative_cell(c, r)` is the cell that sits at the same offset
/// from [`zero_cell`](PeriodicCells::zero_cell) as `c` sits from `r`.
pub trait PeriodicCells: Cells {
    fn zero_cell(&self) -> Self::Cell;

    /// Cells too close to `cell` for a cell-based interaction bound (including `cell` itself).
    fn nearby_cells(&self, cell: Self::Cell) -> Vec<Self::Cell>;

    fn relative_cell(&self, cell: Self::Cell, reference: Self::Cell) -> Self::Cell;

    /// Cell at offset `relative` (measured from the zero cell) away from `cell`.
    fn translate(&self, cell: Self::Cell, relative: Self::Cell) -> Self::Cell;

    /// Lower and upper corner of `cell`.
    fn cell_bounds(&self, cell: Self::Cell) -> (Vec<f64>, Vec<f64>);

    /// Adjacent cell along `direction`, above `cell` if `positive`, wrapping around the box.
    fn neighbor_cell(&self, cell: Self::Cell, direction: usize, positive: bool) -> Self::Cell;
}
