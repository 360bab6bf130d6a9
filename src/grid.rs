use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::error::{Error, Result};

/// Tolerance (in cells) applied before rounding the cell count up, so that
/// spans like `138.08 - 138.0` over `0.04` yield 2 columns and not 3.
const CELL_COUNT_EPSILON: f64 = 1e-9;

/// Largest grid [`build_grid`] agrees to build. Every cell is one request
/// against a shared public API.
pub const MAX_CELLS: usize = 100_000;

/// The inputs a grid is built from.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub boundaries: Boundary,
    pub cell_size: f64,
}

/// A row-major 2D grid of boundary cells.
///
/// Rows run along latitude (south to north) and columns along longitude
/// (west to east). Row-major order defines the order of requests and thus
/// the index of every chunk file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Boundary>,
}

impl Grid {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the cell at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<&Boundary> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    /// Iterates over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &Boundary> + '_ {
        self.cells.iter()
    }

    /// Checks the internal shape, used after loading a grid from disk.
    pub(crate) fn is_consistent(&self) -> bool {
        self.rows > 0
            && self.cols > 0
            && self.rows.checked_mul(self.cols) == Some(self.cells.len())
    }
}

/// Number of `step`-sized cells needed to cover `span`, kept as a float
/// until it is known to fit.
fn cell_count(span: f64, step: f64) -> f64 {
    ((span / step) - CELL_COUNT_EPSILON).ceil().max(1.0)
}

/// Partitions the bounding box into cells of `cell_size` degrees.
///
/// The last row and column are not clamped and may extend slightly past
/// `lat_max` / `long_max`. Grids of more than [`MAX_CELLS`] cells are
/// rejected.
///
/// # Example
/// ```rust
/// # use osm_grid_downloader::build_grid;
/// let grid = build_grid(35.0, 35.08, 138.0, 138.08, 0.04).unwrap();
/// assert_eq!((grid.rows(), grid.cols()), (2, 2));
/// ```
pub fn build_grid(
    lat_min: f64,
    lat_max: f64,
    long_min: f64,
    long_max: f64,
    cell_size: f64,
) -> Result<Grid> {
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(Error::config(format!(
            "cell_size must be a positive number, got {}",
            cell_size
        )));
    }
    let bbox = Boundary::new(lat_min, lat_max, long_min, long_max)?;

    let rows = cell_count(bbox.lat_span(), cell_size);
    let cols = cell_count(bbox.long_span(), cell_size);
    if rows * cols > MAX_CELLS as f64 {
        return Err(Error::config(format!(
            "cell_size {} splits the boundaries into {} x {} cells, more than the maximum of {}",
            cell_size, rows, cols, MAX_CELLS
        )));
    }
    let (rows, cols) = (rows as usize, cols as usize);

    let mut cells = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        let lat = lat_min + i as f64 * cell_size;
        for j in 0..cols {
            let long = long_min + j as f64 * cell_size;
            cells.push(Boundary::new(lat, lat + cell_size, long, long + cell_size)?);
        }
    }

    Ok(Grid { rows, cols, cells })
}

impl GridParams {
    pub fn build(&self) -> Result<Grid> {
        build_grid(
            self.boundaries.lat_min(),
            self.boundaries.lat_max(),
            self.boundaries.long_min(),
            self.boundaries.long_max(),
            self.cell_size,
        )
    }
}
