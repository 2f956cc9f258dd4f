//! Uniform spatial hash grid backing agent neighborhood queries.
//!
//! The grid divides the world rectangle into square cells and buckets agent
//! ids by position. It is rebuilt from scratch every simulation tick
//! (`clear` + `insert` per agent) and read-only afterwards, so queries take
//! no locks. A radius query visits the 3x3 block of cells around the query
//! point and appends every id it finds; the caller filters by distance.
//! This is exact only for radii up to the cell size, which is why the cell
//! size must be chosen at or above the largest single-query radius.

use thiserror::Error;

/// Errors emitted when constructing a grid.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Uniform grid over a world rectangle.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    grid_width: u32,
    grid_height: u32,
    cells: Vec<Vec<u32>>,
}

impl SpatialGrid {
    /// Create a grid covering `world_width` x `world_height` with square
    /// cells of `cell_size` world units.
    pub fn new(world_width: f32, world_height: f32, cell_size: f32) -> Result<Self, IndexError> {
        if !(cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if !(world_width > 0.0) || !(world_height > 0.0) {
            return Err(IndexError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        let grid_width = (world_width / cell_size).ceil().max(1.0) as u32;
        let grid_height = (world_height / cell_size).ceil().max(1.0) as u32;
        Ok(Self {
            cell_size,
            grid_width,
            grid_height,
            cells: vec![Vec::new(); (grid_width as usize) * (grid_height as usize)],
        })
    }

    /// Edge length of one cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of cell columns.
    #[must_use]
    pub const fn grid_width(&self) -> u32 {
        self.grid_width
    }

    /// Number of cell rows.
    #[must_use]
    pub const fn grid_height(&self) -> u32 {
        self.grid_height
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(&self) -> u32 {
        self.grid_width * self.grid_height
    }

    /// Empty every cell list, keeping allocations for the next rebuild.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Append `id` to the cell containing `(x, y)`. Positions outside the
    /// world rectangle are clamped into the border cells.
    pub fn insert(&mut self, id: u32, x: f32, y: f32) {
        let cell = self.hash_position(x, y);
        self.cells[cell].push(id);
    }

    /// Append every id in the 3x3 cell block around `(x, y)` to `out`.
    ///
    /// `out` is cleared first. No distance filtering is performed here; the
    /// caller filters against `radius`. The block is exact for radii up to
    /// the cell size; larger radii get a coarse over-approximation that can
    /// miss neighbors beyond the block.
    pub fn query_neighbors(&self, x: f32, y: f32, _radius: f32, out: &mut Vec<u32>) {
        out.clear();

        let center_x = (x / self.cell_size) as i32;
        let center_y = (y / self.cell_size) as i32;

        for dy in -1..=1 {
            for dx in -1..=1 {
                let cell_x = center_x + dx;
                let cell_y = center_y + dy;
                if !self.is_valid_cell(cell_x, cell_y) {
                    continue;
                }
                let cell = (cell_y as usize) * (self.grid_width as usize) + cell_x as usize;
                out.extend_from_slice(&self.cells[cell]);
            }
        }
    }

    /// Length of the longest cell list, for occupancy tuning.
    #[must_use]
    pub fn max_occupancy(&self) -> u32 {
        self.cells
            .iter()
            .map(|cell| cell.len() as u32)
            .max()
            .unwrap_or(0)
    }

    /// Cell coordinates containing `(x, y)`, clamped into the grid bounds.
    #[must_use]
    pub fn cell_coords(&self, x: f32, y: f32) -> (i32, i32) {
        let cell_x = ((x / self.cell_size) as i32)
            .clamp(0, self.grid_width as i32 - 1);
        let cell_y = ((y / self.cell_size) as i32)
            .clamp(0, self.grid_height as i32 - 1);
        (cell_x, cell_y)
    }

    /// Ids stored in the cell at `(cell_x, cell_y)`, for debug overlays.
    #[must_use]
    pub fn cell_contents(&self, cell_x: i32, cell_y: i32) -> &[u32] {
        if !self.is_valid_cell(cell_x, cell_y) {
            return &[];
        }
        &self.cells[(cell_y as usize) * (self.grid_width as usize) + cell_x as usize]
    }

    #[inline]
    fn hash_position(&self, x: f32, y: f32) -> usize {
        let (cell_x, cell_y) = self.cell_coords(x, y);
        (cell_y as usize) * (self.grid_width as usize) + cell_x as usize
    }

    #[inline]
    fn is_valid_cell(&self, cell_x: i32, cell_y: i32) -> bool {
        cell_x >= 0
            && cell_x < self.grid_width as i32
            && cell_y >= 0
            && cell_y < self.grid_height as i32
    }
}
