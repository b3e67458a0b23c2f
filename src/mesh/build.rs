use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::{
    error::MeshError,
    grid::{Grid, sample_indices},
    mesh::color::ColorRamp,
};

/// Highest quality level accepted; larger values would only ever keep the
/// first and last row/column.
pub const MAX_QUALITY: u8 = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewMode {
    /// Flat heat map: `z` stays at 0, the height channel drives the colors.
    #[default]
    Map2d,
    Relief3d { height_scale: f32 },
}

/// Everything needed to turn a grid into buffers. Cloned into workers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshOptions {
    pub quality: u8,
    pub view_mode: ViewMode,
    /// Explicit ramp; when absent the default ramp is stretched over the
    /// grid's height range.
    pub ramp: Option<ColorRamp>,
}

/// Decimation step for a quality level: every `2^quality`-th row/column.
pub fn quality_step(quality: u8) -> usize {
    1_usize
        .checked_shl(quality.min(MAX_QUALITY) as u32)
        .unwrap_or(1)
        .max(1)
}

////////////////////////////////////////////////
/// MeshBuffers
/// * GPU-ready data derived from a grid at one quality level.
/// * `indices` is shared between buffer sets of the same topology so height
///   updates do not rebuild it.
/// * Holes keep their vertex (at `z = 0`) with a NaN height and a fully
///   transparent color, which keeps the index buffer independent of the data.
////////////////////////////////////////////////
#[derive(Clone, Debug, PartialEq)]
pub struct MeshBuffers {
    pub quality: u8,
    pub source_rows: usize,
    pub source_cols: usize,
    pub sample_rows: Arc<[usize]>,
    pub sample_cols: Arc<[usize]>,
    pub vertices: Vec<MeshVertex>,
    pub heights: Vec<f32>,
    pub indices: Arc<[u32]>,
    pub colors: Vec<[f32; 4]>,
    pub height_range: Option<(f64, f64)>,
}

impl MeshBuffers {
    pub fn build(grid: &Grid, options: &MeshOptions) -> Result<Self, MeshError> {
        let step = quality_step(options.quality);
        let sample_rows: Arc<[usize]> = sample_indices(grid.rows(), step).into();
        let sample_cols: Arc<[usize]> = sample_indices(grid.cols(), step).into();
        let indices = triangulate(sample_rows.len(), sample_cols.len());
        let buffers = Self::fill(grid, options, sample_rows, sample_cols, indices);
        buffers.validate(grid)?;
        Ok(buffers)
    }

    /// New buffer set for a grid of the same shape, sharing this topology.
    pub fn with_heights(&self, grid: &Grid, options: &MeshOptions) -> Result<Self, MeshError> {
        self.check_shape(grid)?;
        if quality_step(options.quality) != quality_step(self.quality) {
            return Self::build(grid, options);
        }
        Ok(Self::fill(
            grid,
            options,
            Arc::clone(&self.sample_rows),
            Arc::clone(&self.sample_cols),
            Arc::clone(&self.indices),
        ))
    }

    fn fill(
        grid: &Grid,
        options: &MeshOptions,
        sample_rows: Arc<[usize]>,
        sample_cols: Arc<[usize]>,
        indices: Arc<[u32]>,
    ) -> Self {
        let count = sample_rows.len() * sample_cols.len();
        let mut vertices = Vec::with_capacity(count);
        let mut heights = Vec::with_capacity(count);
        let mut range: Option<(f64, f64)> = None;

        for &row in sample_rows.iter() {
            for &col in sample_cols.iter() {
                let z = grid.get(row, col);
                if !z.is_nan() {
                    range = Some(match range {
                        None => (z, z),
                        Some((lo, hi)) => (lo.min(z), hi.max(z)),
                    });
                }
                let elevation = match options.view_mode {
                    _ if z.is_nan() => 0.0,
                    ViewMode::Map2d => 0.0,
                    ViewMode::Relief3d { height_scale } => z as f32 * height_scale,
                };
                vertices.push(MeshVertex {
                    position: [grid.x()[col] as f32, grid.y()[row] as f32, elevation],
                });
                heights.push(z as f32);
            }
        }

        let ramp = match (&options.ramp, range) {
            (Some(ramp), _) => ramp.clone(),
            (None, Some((lo, hi))) => ColorRamp::default().rescaled(lo, hi),
            (None, None) => ColorRamp::default(),
        };
        let colors = heights
            .iter()
            .map(|&h| {
                if h.is_nan() {
                    [0.0; 4]
                } else {
                    let [r, g, b] = ramp.sample(h as f64);
                    [r, g, b, 1.0]
                }
            })
            .collect();

        Self {
            quality: options.quality,
            source_rows: grid.rows(),
            source_cols: grid.cols(),
            sample_rows,
            sample_cols,
            vertices,
            heights,
            indices,
            colors,
            height_range: range,
        }
    }

    fn check_shape(&self, grid: &Grid) -> Result<(), MeshError> {
        if grid.rows() != self.source_rows || grid.cols() != self.source_cols {
            return Err(MeshError::StaleBuffers {
                built_rows: self.source_rows,
                built_cols: self.source_cols,
                rows: grid.rows(),
                cols: grid.cols(),
            });
        }
        Ok(())
    }

    /// Checks that the buffers belong to `grid` and that every index is valid.
    pub fn validate(&self, grid: &Grid) -> Result<(), MeshError> {
        self.check_shape(grid)?;
        let vertices = self.vertices.len();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(MeshError::IndexOutOfRange { index, vertices });
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex data as raw bytes, ready for a buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.vertices.as_slice())
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices[..])
    }
}

fn triangulate(rows: usize, cols: usize) -> Arc<[u32]> {
    let mut indices = Vec::with_capacity(rows.saturating_sub(1) * cols.saturating_sub(1) * 6);
    for y in 0..rows.saturating_sub(1) {
        for x in 0..cols.saturating_sub(1) {
            let i0 = (y * cols + x) as u32;
            let i1 = (y * cols + x + 1) as u32;
            let i2 = ((y + 1) * cols + x) as u32;
            let i3 = ((y + 1) * cols + x + 1) as u32;
            indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
        }
    }
    indices.into()
}
