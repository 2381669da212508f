//! `gridsense-perception` – grid-based spatial perception encoder.
//!
//! Scans a regular grid of cells around an observer, picks at most one
//! detectable object per cell and packs the result into a flat tensor that
//! can be shipped as raw floats or as three-channel PNG blocks.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and [`Pose`][transform::Pose] for moving points between the observer and
//!   world frames.
//! - [`octree`] – [`Octree`][octree::Octree]: loose octree of axis-aligned
//!   boxes used as the broad phase of spatial queries.
//! - [`spatial`] – the [`SpatialQuery`][spatial::SpatialQuery] seam and the
//!   in-memory [`SpatialIndex`][spatial::SpatialIndex].
//! - [`grid`] – [`GridGeometry`][grid::GridGeometry]: cell centres and the
//!   point-to-cell mapping.
//! - [`scan`] – [`CandidateBuffer`][scan::CandidateBuffer]: per-cell query
//!   buffer that grows when saturated.
//! - [`selection`] – closest detectable object per cell.
//! - [`encoding`] – [`ChannelLayout`][encoding::ChannelLayout] and the
//!   [`FeatureExtractor`][encoding::FeatureExtractor] strategies.
//! - [`activity`] – per-cell debug callbacks.
//! - [`compression`] – image-block serialisation and the PNG codec.
//! - [`sensor`] – [`GridSensor`][sensor::GridSensor]: ties the cycle together.

pub mod activity;
pub mod compression;
pub mod encoding;
pub mod grid;
pub mod octree;
pub mod scan;
pub mod selection;
pub mod sensor;
pub mod spatial;
pub mod transform;

pub use compression::{CompressedObservation, ImageCodec, ObservationShape, PngCodec};
pub use sensor::{GridSensor, Observer, ObserverTransform};
pub use spatial::{SpatialIndex, SpatialQuery, WorldObject};
