//! The grid sensor: one perception cycle from world to tensor.
//!
//! Each call to [`GridSensor::perceive`] resets the perception buffer,
//! queries the world once per cell, keeps the detectable object closest to
//! the observer, and encodes its features into the cell's slice.  The
//! resulting buffer can be read back as a raw tensor or serialised into
//! three-channel image blocks.
//!
//! # Example
//!
//! ```rust
//! use gridsense_perception::octree::Aabb;
//! use gridsense_perception::sensor::{GridSensor, Observer};
//! use gridsense_perception::spatial::{SpatialIndex, WorldObject};
//! use gridsense_perception::transform::{Pose, Vec3};
//! use gridsense_types::GridConfiguration;
//!
//! let config = GridConfiguration {
//!     grid_num_side_x: 4,
//!     grid_num_side_z: 4,
//!     channel_depth: vec![5],
//!     detectable_tags: vec!["wall".into(), "food".into()],
//!     ..Default::default()
//! };
//! let mut sensor = GridSensor::new(config).unwrap();
//!
//! let mut world = SpatialIndex::new(Aabb::new(Vec3::new(-10.0, -10.0, -10.0),
//!                                             Vec3::new( 10.0,  10.0,  10.0)));
//! // Centre of cell 6 (column 2, row 1).
//! world.insert(WorldObject::new("apple", "food",
//!     Aabb::from_center(Vec3::new(0.5, 0.0, -0.5), Vec3::new(0.2, 0.2, 0.2))));
//!
//! let buffer = sensor.perceive(&world, &Observer::new(Pose::default())).unwrap();
//! assert!((buffer[6] - 0.4).abs() < 1e-6);
//! assert_eq!(buffer.iter().filter(|&&v| v != 0.0).count(), 1);
//! ```

use gridsense_types::{CompressionType, GridConfiguration, GridError, ObjectId};
use tracing::info;

use crate::activity::{CellObserver, NoopObserver};
use crate::compression::{CompressedObservation, ImageCodec, ObservationShape, encode_blocks};
use crate::encoding::{CategoryExtractor, ChannelLayout, FeatureExtractor};
use crate::grid::GridGeometry;
use crate::scan::CandidateBuffer;
use crate::selection::{DetectedObject, select_closest};
use crate::spatial::{OrientedBox, SpatialQuery};
use crate::transform::{Pose, Quaternion, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Observer
// ────────────────────────────────────────────────────────────────────────────

/// Where the sensor is mounted.
pub trait ObserverTransform {
    /// World pose of the observer for this cycle.
    fn pose(&self) -> Pose;

    /// The observer's own object, never reported by the sensor.
    fn root(&self) -> Option<ObjectId> {
        None
    }
}

/// Plain [`ObserverTransform`] value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observer {
    pub pose: Pose,
    pub root: Option<ObjectId>,
}

impl Observer {
    pub fn new(pose: Pose) -> Self {
        Self { pose, root: None }
    }

    pub fn with_root(mut self, root: ObjectId) -> Self {
        self.root = Some(root);
        self
    }
}

impl ObserverTransform for Observer {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn root(&self) -> Option<ObjectId> {
        self.root
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GridSensor
// ────────────────────────────────────────────────────────────────────────────

/// Grid perception encoder.
///
/// Owns its perception buffer and candidate buffer; every cycle takes
/// `&mut self`, while the world is only borrowed.
pub struct GridSensor {
    config: GridConfiguration,
    geometry: GridGeometry,
    layout: ChannelLayout,
    buffer: Vec<f32>,
    candidates: CandidateBuffer,
    extractor: Box<dyn FeatureExtractor>,
    features: Vec<f32>,
}

impl std::fmt::Debug for GridSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSensor")
            .field("name", &self.config.name)
            .field("shape", &self.shape())
            .field("candidate_capacity", &self.candidates.capacity())
            .finish_non_exhaustive()
    }
}

impl GridSensor {
    /// Build a sensor with the default [`CategoryExtractor`].
    ///
    /// # Errors
    ///
    /// [`GridError::InvalidConfiguration`] for out-of-range fields and
    /// [`GridError::TooManyChannels`] when a cell would need 765 or more
    /// values.
    pub fn new(config: GridConfiguration) -> Result<Self, GridError> {
        config.validate()?;
        let layout = ChannelLayout::new(&config.channel_depth, config.depth_type)?;
        let geometry = GridGeometry::new(&config);
        let mut buffer = vec![0.0; geometry.num_cells() * layout.observation_per_cell()];
        layout.reset(&mut buffer);
        let candidates = CandidateBuffer::new(
            config.initial_candidate_buffer_size,
            config.max_candidate_buffer_size,
        );
        let features = vec![0.0; layout.num_channels()];

        log_configuration(&config, &layout);
        Ok(Self {
            config,
            geometry,
            layout,
            buffer,
            candidates,
            extractor: Box::new(CategoryExtractor),
            features,
        })
    }

    /// Replace the feature extractor.
    pub fn with_extractor(mut self, extractor: impl FeatureExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Apply a new configuration, rebuilding every derived table and the
    /// perception buffer.  The candidate buffer keeps the size it has grown
    /// to, capped at the new maximum.
    ///
    /// On error the sensor keeps its previous configuration.
    pub fn reconfigure(&mut self, config: GridConfiguration) -> Result<(), GridError> {
        config.validate()?;
        let layout = ChannelLayout::new(&config.channel_depth, config.depth_type)?;
        self.geometry = GridGeometry::new(&config);
        self.buffer = vec![0.0; self.geometry.num_cells() * layout.observation_per_cell()];
        layout.reset(&mut self.buffer);
        self.candidates.reallocate(
            config.initial_candidate_buffer_size,
            config.max_candidate_buffer_size,
        );
        self.features = vec![0.0; layout.num_channels()];
        self.layout = layout;

        log_configuration(&config, &self.layout);
        self.config = config;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn compression_type(&self) -> CompressionType {
        self.config.compression
    }

    pub fn config(&self) -> &GridConfiguration {
        &self.config
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Current size of the candidate buffer.
    pub fn candidate_capacity(&self) -> usize {
        self.candidates.capacity()
    }

    /// Tensor dimensions: `(grid_num_side_x, grid_num_side_z, observation_per_cell)`.
    pub fn shape(&self) -> ObservationShape {
        ObservationShape {
            width: self.geometry.num_side_x(),
            height: self.geometry.num_side_z(),
            depth: self.layout.observation_per_cell(),
        }
    }

    /// The perception buffer, `observation_per_cell` values per cell in cell
    /// order.
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    /// The encoded slice of one cell.
    pub fn cell(&self, cell: usize) -> Option<&[f32]> {
        let opc = self.layout.observation_per_cell();
        self.buffer.get(cell * opc..(cell + 1) * opc)
    }

    /// Put every cell back to the default pattern.
    pub fn reset(&mut self) {
        self.layout.reset(&mut self.buffer);
    }

    // ── Perception ──────────────────────────────────────────────────────────

    /// Run one perception cycle and return the perception buffer.
    ///
    /// # Errors
    ///
    /// [`GridError::ValueOutOfRange`] when the extractor produces a value
    /// its channel cannot hold.  The cycle stops at the offending cell and
    /// the buffer is left partially written.
    pub fn perceive<W, O>(&mut self, world: &W, observer: &O) -> Result<&[f32], GridError>
    where
        W: SpatialQuery + ?Sized,
        O: ObserverTransform + ?Sized,
    {
        self.perceive_with(world, observer, &mut NoopObserver)
    }

    /// [`perceive`][Self::perceive], notifying `cells` once per cell with the
    /// object the cell reported.
    pub fn perceive_with<W, O>(
        &mut self,
        world: &W,
        observer: &O,
        cells: &mut dyn CellObserver,
    ) -> Result<&[f32], GridError>
    where
        W: SpatialQuery + ?Sized,
        O: ObserverTransform + ?Sized,
    {
        self.layout.reset(&mut self.buffer);

        let pose = observer.pose();
        let root = observer.root();
        let frame = self.grid_frame(pose);
        let half_extent = self.geometry.half_cell_extent();
        let inverse_radius = self.geometry.inverse_sphere_radius();

        for cell in 0..self.geometry.num_cells() {
            let center = frame.transform_point(self.geometry.cell_points()[cell]);
            let volume = OrientedBox::new(center, half_extent, frame.rotation);
            let found = self.candidates.query(world, &volume, self.config.observe_mask);

            let detected = if found > 0 {
                select_closest(
                    world,
                    self.candidates.candidates(found),
                    &self.config.detectable_tags,
                    root,
                    pose.position,
                    center,
                    inverse_radius,
                )
            } else {
                None
            };

            if let Some(hit) = &detected {
                self.load_object(world, cell, hit)?;
            }
            cells.on_cell(cell, detected.as_ref());
        }
        Ok(&self.buffer)
    }

    fn load_object<W>(&mut self, world: &W, cell: usize, hit: &DetectedObject) -> Result<(), GridError>
    where
        W: SpatialQuery + ?Sized,
    {
        let Some(object) = world.object(hit.id) else {
            return Ok(());
        };
        self.features.fill(0.0);
        self.extractor
            .extract(object, hit.category(), hit.normalized_distance, &mut self.features);

        let opc = self.layout.observation_per_cell();
        let slice = &mut self.buffer[cell * opc..(cell + 1) * opc];
        self.layout.encode(&self.features, slice, &object.name)
    }

    /// Frame the grid is laid out in: the full observer pose when rotating
    /// with the observer, its position only otherwise.
    fn grid_frame(&self, pose: Pose) -> Pose {
        if self.config.rotate_to_agent {
            pose
        } else {
            Pose::new(pose.position, Quaternion::identity())
        }
    }

    // ── Cell addressing ─────────────────────────────────────────────────────

    /// World-space centre of `cell` for the given observer.
    pub fn cell_center<O>(&self, cell: usize, observer: &O) -> Option<Vec3>
    where
        O: ObserverTransform + ?Sized,
    {
        let point = self.geometry.cell_points().get(cell)?;
        Some(self.grid_frame(observer.pose()).transform_point(*point))
    }

    /// Cell containing a world-space point, or `None` when it falls outside
    /// the grid.
    pub fn point_to_cell<O>(&self, point: Vec3, observer: &O) -> Option<usize>
    where
        O: ObserverTransform + ?Sized,
    {
        self.geometry.world_to_cell(point, &self.grid_frame(observer.pose()))
    }

    /// Copy the encoded slice of `from` over `to`.  Returns `false` when
    /// either index is out of range.
    pub fn copy_cell(&mut self, from: usize, to: usize) -> bool {
        let cells = self.geometry.num_cells();
        if from >= cells || to >= cells {
            return false;
        }
        let opc = self.layout.observation_per_cell();
        self.buffer.copy_within(from * opc..(from + 1) * opc, to * opc);
        true
    }

    // ── Output ──────────────────────────────────────────────────────────────

    /// Write the buffer into `out` as a `height × width × depth` tensor.
    /// Tensor row 0 holds the last cell row, so the grid reads top-down with
    /// +z at the top.  Returns the number of values written.
    pub fn write_tensor(&self, out: &mut [f32]) -> Result<usize, GridError> {
        let shape = self.shape();
        if out.len() < shape.len() {
            return Err(GridError::ShapeMismatch {
                expected: shape.len(),
                actual: out.len(),
            });
        }
        let row_len = shape.width * shape.depth;
        for (h, dst) in out[..shape.len()].chunks_exact_mut(row_len).enumerate() {
            let src_row = shape.height - 1 - h;
            dst.copy_from_slice(&self.buffer[src_row * row_len..(src_row + 1) * row_len]);
        }
        Ok(shape.len())
    }

    /// The buffer as a freshly allocated `height × width × depth` tensor.
    /// See [`write_tensor`][Self::write_tensor].
    pub fn raw_tensor(&self) -> Vec<f32> {
        let shape = self.shape();
        let row_len = shape.width * shape.depth;
        self.buffer
            .chunks_exact(row_len)
            .rev()
            .flatten()
            .copied()
            .collect()
    }

    /// Encode the current buffer as image blocks.
    pub fn serialize(&self, codec: &dyn ImageCodec) -> Result<CompressedObservation, GridError> {
        encode_blocks(&self.buffer, self.shape(), codec)
    }

    /// Perceive, then serialise.
    pub fn compressed_observation<W, O>(
        &mut self,
        world: &W,
        observer: &O,
        codec: &dyn ImageCodec,
    ) -> Result<CompressedObservation, GridError>
    where
        W: SpatialQuery + ?Sized,
        O: ObserverTransform + ?Sized,
    {
        self.perceive(world, observer)?;
        self.serialize(codec)
    }
}

fn log_configuration(config: &GridConfiguration, layout: &ChannelLayout) {
    info!(
        name = %config.name,
        cells_x = config.grid_num_side_x,
        cells_z = config.grid_num_side_z,
        depth_type = %config.depth_type,
        observation_per_cell = layout.observation_per_cell(),
        tags = config.detectable_tags.len(),
        "grid sensor configured"
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
