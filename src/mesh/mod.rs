pub mod build;
pub mod color;

use std::sync::Arc;

use tracing::info;

pub use build::{MAX_QUALITY, MeshBuffers, MeshOptions, MeshVertex, ViewMode, quality_step};
pub use color::{ColorRamp, ColorStop, MAX_RAMP_ENTRIES};

use crate::{
    error::{MeshError, Result},
    grid::Grid,
    interpolation::Interpolator,
};

pub type ModelId = u32;

////////////////////////////////////////////////
/// GridModel
/// * Owns the backing grid and the buffers derived from it.
/// * Both are held behind `Arc`s and replaced wholesale: a renderer holding
///   the previous `Arc<MeshBuffers>` keeps a complete, consistent set.
/// * `install` is the single entry point for new data and validates before
///   swapping, so a failed rebuild leaves the previous state in place.
////////////////////////////////////////////////
#[derive(Debug)]
pub struct GridModel {
    id: ModelId,
    name: String,
    grid: Arc<Grid>,
    buffers: Arc<MeshBuffers>,
    options: MeshOptions,
    lookup: Interpolator,
    optimized: bool,
}

impl GridModel {
    pub fn new(id: ModelId, name: impl Into<String>, grid: Grid, options: MeshOptions) -> Result<Self> {
        let buffers = MeshBuffers::build(&grid, &options)?;
        Ok(Self::from_parts(id, name, Arc::new(grid), Arc::new(buffers), options))
    }

    /// Wraps a grid and buffers prepared elsewhere (typically on a worker).
    pub fn from_parts(
        id: ModelId,
        name: impl Into<String>,
        grid: Arc<Grid>,
        buffers: Arc<MeshBuffers>,
        options: MeshOptions,
    ) -> Self {
        let model = Self {
            id,
            name: name.into(),
            grid,
            buffers,
            options,
            lookup: Interpolator::default(),
            optimized: false,
        };
        info!(
            resource = "mesh",
            model = model.id,
            rows = model.grid.rows(),
            cols = model.grid.cols(),
            quality = model.options.quality,
            vertices = model.buffers.vertex_count(),
            "model created"
        );
        model
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quality(&self) -> u8 {
        self.options.quality
    }

    pub fn options(&self) -> &MeshOptions {
        &self.options
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Shared snapshot of the backing grid, safe to hand to a worker.
    pub fn snapshot(&self) -> Arc<Grid> {
        Arc::clone(&self.grid)
    }

    pub fn buffers(&self) -> Arc<MeshBuffers> {
        Arc::clone(&self.buffers)
    }

    pub fn set_lookup(&mut self, lookup: Interpolator) {
        self.lookup = lookup;
    }

    /// Rebuilds everything from raw arrays at the given quality.
    pub fn set_from_grid(&mut self, x: Vec<f64>, y: Vec<f64>, z: Vec<Vec<f64>>, quality: u8) -> Result<()> {
        let grid = Grid::from_rows(x, y, z)?;
        let options = MeshOptions {
            quality: quality.min(MAX_QUALITY),
            ..self.options.clone()
        };
        let buffers = MeshBuffers::build(&grid, &options)?;
        self.install(Arc::new(grid), Arc::new(buffers))?;
        self.options = options;
        self.optimized = false;
        Ok(())
    }

    /// Replaces the heights while keeping the grid shape and mesh topology.
    pub fn update_vertices(&mut self, z: Vec<f64>) -> Result<()> {
        if z.len() != self.grid.len() {
            return Err(MeshError::HeightCount {
                expected: self.grid.len(),
                got: z.len(),
            }
            .into());
        }
        let grid = self.grid.with_heights(z)?;
        let buffers = self.buffers.with_heights(&grid, &self.options)?;
        self.install(Arc::new(grid), Arc::new(buffers))
    }

    /// Builds the buffers `install` expects for `grid`, without touching the
    /// model, so it can run off the owning thread. The previous topology is
    /// reused when the grid shape did not change.
    pub fn prepare_buffers(grid: &Grid, previous: &MeshBuffers, options: &MeshOptions) -> Result<MeshBuffers> {
        let same_shape = previous.source_rows == grid.rows() && previous.source_cols == grid.cols();
        let buffers = if same_shape {
            previous.with_heights(grid, options)?
        } else {
            MeshBuffers::build(grid, options)?
        };
        Ok(buffers)
    }

    /// Swaps in a new grid and buffer set. Nothing changes if the buffers do
    /// not match the grid.
    pub fn install(&mut self, grid: Arc<Grid>, buffers: Arc<MeshBuffers>) -> Result<()> {
        buffers.validate(&grid)?;
        info!(
            resource = "mesh",
            model = self.id,
            quality = buffers.quality,
            vertices = buffers.vertex_count(),
            triangles = buffers.triangle_count(),
            "installing buffers"
        );
        self.options.quality = buffers.quality;
        self.grid = grid;
        self.buffers = buffers;
        Ok(())
    }

    pub fn set_quality(&mut self, quality: u8) -> Result<()> {
        let options = MeshOptions {
            quality: quality.min(MAX_QUALITY),
            ..self.options.clone()
        };
        let buffers = MeshBuffers::build(&self.grid, &options)?;
        self.options = options;
        self.install(Arc::clone(&self.grid), Arc::new(buffers))
    }

    pub fn set_color_ramp(&mut self, ramp: Option<ColorRamp>) -> Result<()> {
        self.restyle(MeshOptions {
            ramp,
            ..self.options.clone()
        })
    }

    pub fn set_view_mode(&mut self, view_mode: ViewMode) -> Result<()> {
        self.restyle(MeshOptions {
            view_mode,
            ..self.options.clone()
        })
    }

    fn restyle(&mut self, options: MeshOptions) -> Result<()> {
        let buffers = self.buffers.with_heights(&self.grid, &options)?;
        self.options = options;
        self.install(Arc::clone(&self.grid), Arc::new(buffers))
    }

    /// Height under a coordinate, interpolated from the backing grid.
    /// `None` outside the grid or when the grid holds no defined sample.
    pub fn height_at(&self, x: f64, y: f64) -> Option<f64> {
        if !self.grid.bounds().contains(x, y) {
            return None;
        }
        self.lookup.estimate(&self.grid, x, y).ok()
    }

    /// Closest `(row, col)` of the backing grid.
    pub fn index_of(&self, x: f64, y: f64) -> (usize, usize) {
        self.grid.index_of(x, y)
    }

    pub fn height_range(&self) -> Option<(f64, f64)> {
        self.grid.height_range()
    }

    /// Drops the full-resolution grid, keeping only the samples the mesh
    /// uses. Queries keep working on the reduced grid, which becomes the
    /// model's base grid at quality 0. Nothing happens while the mesh already
    /// samples every row and column.
    pub fn optimize_gpu_memory(&mut self) -> Result<()> {
        if self.buffers.sample_rows.len() == self.grid.rows()
            && self.buffers.sample_cols.len() == self.grid.cols()
        {
            self.optimized = true;
            return Ok(());
        }
        let before = self.grid.len();
        let reduced = self.grid.decimated(quality_step(self.options.quality));
        let options = MeshOptions {
            quality: 0,
            ..self.options.clone()
        };
        let buffers = MeshBuffers::build(&reduced, &options)?;
        self.options = options;
        self.install(Arc::new(reduced), Arc::new(buffers))?;
        self.optimized = true;
        info!(
            resource = "mesh",
            model = self.id,
            before,
            after = self.grid.len(),
            "released full-resolution grid"
        );
        Ok(())
    }
}
