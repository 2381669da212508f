//! Grid geometry: mapping between cell indices and observer-frame points.
//!
//! Cells are laid out row-major in the observer's horizontal plane.  Cell
//! `i` sits in column `i % grid_num_side_x` (along x) and row
//! `i / grid_num_side_x` (along z).  The grid is centred on the observer, so
//! the centre of cell `i` is
//!
//! ```text
//! x = (i % nx - (nx - 1) / 2) * cell_scale_x
//! z = (i / nx - (nz - 1) / 2) * cell_scale_z
//! ```
//!
//! and [`GridGeometry::point_to_cell`] inverts that mapping, returning `None`
//! for points outside the grid's half-extents.

use gridsense_types::GridConfiguration;

use crate::transform::{Pose, Vec3};

/// Derived, immutable geometry of one grid configuration.
///
/// Cell centres are computed once at construction and reused every cycle.
#[derive(Debug, Clone)]
pub struct GridGeometry {
    cell_scale_x: f32,
    cell_scale_y: f32,
    cell_scale_z: f32,
    num_side_x: usize,
    num_side_z: usize,
    offset_x: f32,
    offset_z: f32,
    half_x: f32,
    half_z: f32,
    inverse_sphere_radius: f32,
    cell_points: Vec<Vec3>,
}

impl GridGeometry {
    /// Derive the geometry of `config`.  The configuration is assumed to have
    /// passed [`GridConfiguration::validate`].
    pub fn new(config: &GridConfiguration) -> Self {
        let sx = config.cell_scale_x;
        let sz = config.cell_scale_z;
        let nx = config.grid_num_side_x;
        let nz = config.grid_num_side_z;

        let sphere_radius_x = sx * nx as f32 / std::f32::consts::SQRT_2;
        let sphere_radius_z = sz * nz as f32 / std::f32::consts::SQRT_2;

        let mut geometry = Self {
            cell_scale_x: sx,
            cell_scale_y: config.cell_scale_y,
            cell_scale_z: sz,
            num_side_x: nx,
            num_side_z: nz,
            offset_x: (nx as f32 - 1.0) / 2.0,
            offset_z: (nz as f32 - 1.0) / 2.0,
            half_x: sx * nx as f32 / 2.0,
            half_z: sz * nz as f32 / 2.0,
            inverse_sphere_radius: 1.0 / sphere_radius_x.max(sphere_radius_z),
            cell_points: Vec::new(),
        };
        geometry.cell_points = (0..nx * nz).map(|i| geometry.cell_to_point(i)).collect();
        geometry
    }

    pub fn num_side_x(&self) -> usize {
        self.num_side_x
    }

    pub fn num_side_z(&self) -> usize {
        self.num_side_z
    }

    pub fn num_cells(&self) -> usize {
        self.num_side_x * self.num_side_z
    }

    /// `1 / max(sx * nx, sz * nz) * √2`: scales a distance from the observer
    /// to roughly `[0, 1]` for points inside the grid.
    pub fn inverse_sphere_radius(&self) -> f32 {
        self.inverse_sphere_radius
    }

    /// Half extents of a single cell's query volume.  The vertical extent is
    /// the full `cell_scale_y`.
    pub fn half_cell_extent(&self) -> Vec3 {
        Vec3::new(self.cell_scale_x / 2.0, self.cell_scale_y, self.cell_scale_z / 2.0)
    }

    /// Cached observer-frame centres of every cell, indexed by cell.
    pub fn cell_points(&self) -> &[Vec3] {
        &self.cell_points
    }

    /// Centre of `cell` in the observer frame (`y` is always zero).
    pub fn cell_to_point(&self, cell: usize) -> Vec3 {
        let column = (cell % self.num_side_x) as f32;
        let row = (cell / self.num_side_x) as f32;
        Vec3::new(
            (column - self.offset_x) * self.cell_scale_x,
            0.0,
            (row - self.offset_z) * self.cell_scale_z,
        )
    }

    /// Centre of `cell` in the world frame for an observer at `pose`.
    pub fn cell_to_world(&self, cell: usize, pose: &Pose) -> Vec3 {
        pose.transform_point(self.cell_to_point(cell))
    }

    /// Index of the cell containing an observer-frame point, or `None` when
    /// the point is outside the grid.  The vertical coordinate is ignored.
    ///
    /// Points exactly on the far edge belong to the last row or column.
    pub fn point_to_cell(&self, point: Vec3) -> Option<usize> {
        if point.x < -self.half_x
            || point.x > self.half_x
            || point.z < -self.half_z
            || point.z > self.half_z
            || point.x.is_nan()
            || point.z.is_nan()
        {
            return None;
        }
        let column = (((point.x + self.half_x) / self.cell_scale_x).floor() as usize)
            .min(self.num_side_x - 1);
        let row = (((point.z + self.half_z) / self.cell_scale_z).floor() as usize)
            .min(self.num_side_z - 1);
        Some(row * self.num_side_x + column)
    }

    /// Index of the cell containing a world-frame point for an observer at
    /// `pose`, or `None` when the point is outside the grid.
    pub fn world_to_cell(&self, point: Vec3, pose: &Pose) -> Option<usize> {
        self.point_to_cell(pose.inverse_transform_point(point))
    }
}
