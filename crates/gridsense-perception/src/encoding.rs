//! Channel encoding: turn one object's feature values into a cell slice.
//!
//! Every cell owns `observation_per_cell` consecutive floats in the
//! perception buffer.  A [`FeatureExtractor`] produces one raw value per
//! channel, and [`ChannelLayout::encode`] validates and packs them according
//! to the configured [`DepthType`]:
//!
//! - **Channel**: one float per channel, `value / depth`.
//! - **ChannelHot**: channels of depth 1 are copied through; channels of
//!   depth `n > 1` become an `n`-wide one-hot span.
//!
//! # Example
//!
//! ```rust
//! use gridsense_perception::encoding::ChannelLayout;
//! use gridsense_types::DepthType;
//!
//! // A 5-way category followed by a 3-way team id.
//! let layout = ChannelLayout::new(&[5, 3], DepthType::ChannelHot).unwrap();
//! assert_eq!(layout.observation_per_cell(), 8);
//!
//! let mut cell = vec![0.0; 8];
//! layout.encode(&[2.0, 1.0], &mut cell, "crate-7").unwrap();
//! assert_eq!(cell, vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
//! ```

use gridsense_types::{DepthType, GridError, MAX_OBSERVATION_PER_CELL};

use crate::spatial::WorldObject;

// ────────────────────────────────────────────────────────────────────────────
// ChannelLayout
// ────────────────────────────────────────────────────────────────────────────

/// Per-cell layout derived from the channel depths and depth type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelLayout {
    depths: Vec<u32>,
    depth_type: DepthType,
    offsets: Vec<usize>,
    observation_per_cell: usize,
    default_cell: Vec<f32>,
}

impl ChannelLayout {
    /// Derive the layout for `depths`.
    ///
    /// # Errors
    ///
    /// [`GridError::InvalidConfiguration`] when `depths` is empty or holds a
    /// zero, [`GridError::TooManyChannels`] when a cell would need
    /// `MAX_OBSERVATION_PER_CELL` values or more.
    pub fn new(depths: &[u32], depth_type: DepthType) -> Result<Self, GridError> {
        if depths.is_empty() || depths.contains(&0) {
            return Err(GridError::InvalidConfiguration {
                field: "channel_depth".to_string(),
                details: "expected one or more depths, each >= 1".to_string(),
            });
        }

        let mut offsets = Vec::with_capacity(depths.len());
        let mut running = 0usize;
        for &d in depths {
            offsets.push(running);
            running += d as usize;
        }

        let observation_per_cell = match depth_type {
            DepthType::Channel => depths.len(),
            DepthType::ChannelHot => running,
        };
        if observation_per_cell >= MAX_OBSERVATION_PER_CELL {
            return Err(GridError::TooManyChannels { observation_per_cell });
        }

        let mut default_cell = vec![0.0; observation_per_cell];
        if depth_type == DepthType::ChannelHot {
            for (&d, &offset) in depths.iter().zip(&offsets) {
                if d > 1 {
                    default_cell[offset] = 1.0;
                }
            }
        }

        Ok(Self {
            depths: depths.to_vec(),
            depth_type,
            offsets,
            observation_per_cell,
            default_cell,
        })
    }

    pub fn depths(&self) -> &[u32] {
        &self.depths
    }

    pub fn depth_type(&self) -> DepthType {
        self.depth_type
    }

    /// Number of channels (feature values per object).
    pub fn num_channels(&self) -> usize {
        self.depths.len()
    }

    /// Start of each channel's one-hot span (prefix sums of the depths).
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn observation_per_cell(&self) -> usize {
        self.observation_per_cell
    }

    /// What an empty cell looks like: all zeros under `Channel`, slot 0 of
    /// every multi-value span set under `ChannelHot`.
    pub fn default_cell(&self) -> &[f32] {
        &self.default_cell
    }

    /// Overwrite every cell of `buffer` with the default pattern.
    pub fn reset(&self, buffer: &mut [f32]) {
        for cell in buffer.chunks_exact_mut(self.observation_per_cell) {
            cell.copy_from_slice(&self.default_cell);
        }
    }

    /// Check `values` against the channel depths without writing anything.
    ///
    /// # Errors
    ///
    /// [`GridError::ValueOutOfRange`] for the first value below 0 or above
    /// its depth.  One-hot channels (depth > 1 under `ChannelHot`) also
    /// reject `value == depth`, which has no slot in the span.
    pub fn validate(&self, values: &[f32], object: &str) -> Result<(), GridError> {
        for (channel, (&value, &depth)) in values.iter().zip(&self.depths).enumerate() {
            let limit = depth as f32;
            let one_hot = self.depth_type == DepthType::ChannelHot && depth > 1;
            let below_limit = if one_hot { value < limit } else { value <= limit };
            if !(value >= 0.0 && below_limit) {
                return Err(GridError::ValueOutOfRange {
                    channel,
                    object: object.to_string(),
                    value,
                    depth,
                });
            }
        }
        Ok(())
    }

    /// Validate `values` and write them into `cell`.
    ///
    /// `cell` must be exactly `observation_per_cell` long.  It is zeroed
    /// before writing, so under `ChannelHot` every multi-value channel ends
    /// up with exactly one set slot.  Nothing is written on error.
    pub fn encode(&self, values: &[f32], cell: &mut [f32], object: &str) -> Result<(), GridError> {
        if cell.len() != self.observation_per_cell {
            return Err(GridError::ShapeMismatch {
                expected: self.observation_per_cell,
                actual: cell.len(),
            });
        }
        self.validate(values, object)?;

        cell.fill(0.0);
        match self.depth_type {
            DepthType::Channel => {
                for ((slot, &value), &depth) in cell.iter_mut().zip(values).zip(&self.depths) {
                    *slot = value / depth as f32;
                }
            }
            DepthType::ChannelHot => {
                for ((&value, &depth), &offset) in values.iter().zip(&self.depths).zip(&self.offsets) {
                    if depth > 1 {
                        cell[offset + value as usize] = 1.0;
                    } else {
                        cell[offset] = value;
                    }
                }
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Feature extraction
// ────────────────────────────────────────────────────────────────────────────

/// Produces the raw per-channel values of a detected object.
///
/// `features` has one slot per channel and arrives zeroed.  `category` is
/// `tag_index + 1` (0 is reserved for "empty") and `normalized_distance` is
/// the observer distance scaled to roughly `[0, 1]`.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, object: &WorldObject, category: f32, normalized_distance: f32, features: &mut [f32]);
}

/// Writes the object's category into channel 0 and leaves the rest at 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryExtractor;

impl FeatureExtractor for CategoryExtractor {
    fn extract(&self, _object: &WorldObject, category: f32, _normalized_distance: f32, features: &mut [f32]) {
        if let Some(first) = features.first_mut() {
            *first = category;
        }
    }
}

/// Category in channel 0 followed by the object's attributes in channels
/// `1..`.  Missing attributes read as 0; extra ones are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeExtractor;

impl FeatureExtractor for AttributeExtractor {
    fn extract(&self, object: &WorldObject, category: f32, _normalized_distance: f32, features: &mut [f32]) {
        let Some((first, rest)) = features.split_first_mut() else {
            return;
        };
        *first = category;
        for (slot, &value) in rest.iter_mut().zip(&object.attributes) {
            *slot = value;
        }
    }
}

/// Writes the normalised observer distance into channel 0, ignoring the
/// category.  Pair with a depth-1 channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceExtractor;

impl FeatureExtractor for DistanceExtractor {
    fn extract(&self, _object: &WorldObject, _category: f32, normalized_distance: f32, features: &mut [f32]) {
        if let Some(first) = features.first_mut() {
            *first = normalized_distance;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::Aabb;
    use crate::transform::Vec3;

    fn object(attributes: Vec<f32>) -> WorldObject {
        WorldObject::new("probe", "food", Aabb::from_center(Vec3::zero(), Vec3::new(0.5, 0.5, 0.5)))
            .with_attributes(attributes)
    }

    #[test]
    fn offsets_are_prefix_sums() {
        let layout = ChannelLayout::new(&[5, 1, 3], DepthType::ChannelHot).unwrap();
        assert_eq!(layout.offsets(), &[0, 5, 6]);
        assert_eq!(layout.observation_per_cell(), 9);

        let channel = ChannelLayout::new(&[5, 1, 3], DepthType::Channel).unwrap();
        assert_eq!(channel.observation_per_cell(), 3);
    }

    #[test]
    fn channel_hot_default_sets_slot_zero_of_multi_value_spans() {
        let layout = ChannelLayout::new(&[3, 1, 2], DepthType::ChannelHot).unwrap();
        assert_eq!(layout.default_cell(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let mut buf = vec![7.0; 12];
        layout.reset(&mut buf);
        assert_eq!(&buf[..6], layout.default_cell());
        assert_eq!(&buf[6..], layout.default_cell());
    }

    #[test]
    fn channel_default_is_all_zero() {
        let layout = ChannelLayout::new(&[3, 1], DepthType::Channel).unwrap();
        let mut buf = vec![7.0; 8];
        layout.reset(&mut buf);
        assert!(buf.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn too_many_channels_is_rejected() {
        let err = ChannelLayout::new(&[765], DepthType::ChannelHot).unwrap_err();
        assert_eq!(err, GridError::TooManyChannels { observation_per_cell: 765 });
        assert!(ChannelLayout::new(&[764], DepthType::ChannelHot).is_ok());
        // Under Channel the same depth is a single value.
        assert!(ChannelLayout::new(&[765], DepthType::Channel).is_ok());
    }

    #[test]
    fn zero_depth_is_rejected() {
        assert!(ChannelLayout::new(&[2, 0], DepthType::Channel).is_err());
        assert!(ChannelLayout::new(&[], DepthType::Channel).is_err());
    }

    #[test]
    fn channel_mode_normalises_by_depth() {
        let layout = ChannelLayout::new(&[5, 3, 1], DepthType::Channel).unwrap();
        let mut cell = vec![0.0; 3];
        layout.encode(&[2.0, 1.0, 0.25], &mut cell, "a").unwrap();
        assert!((cell[0] - 0.4).abs() < 1e-6);
        assert!((cell[1] - 1.0 / 3.0).abs() < 1e-6);
        assert!((cell[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn channel_mode_accepts_value_equal_to_depth() {
        let layout = ChannelLayout::new(&[5], DepthType::Channel).unwrap();
        let mut cell = vec![0.0; 1];
        layout.encode(&[5.0], &mut cell, "a").unwrap();
        assert_eq!(cell[0], 1.0);
    }

    #[test]
    fn values_just_outside_range_are_rejected() {
        let layout = ChannelLayout::new(&[5], DepthType::Channel).unwrap();
        let mut cell = vec![0.25; 1];
        let eps = 1e-3;

        let err = layout.encode(&[5.0 + eps], &mut cell, "crate-7").unwrap_err();
        match err {
            GridError::ValueOutOfRange { channel, object, depth, .. } => {
                assert_eq!(channel, 0);
                assert_eq!(object, "crate-7");
                assert_eq!(depth, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(layout.encode(&[-eps], &mut cell, "crate-7").is_err());
        assert!(layout.encode(&[f32::NAN], &mut cell, "crate-7").is_err());
        // Nothing was written.
        assert_eq!(cell[0], 0.25);
    }

    #[test]
    fn one_hot_rejects_value_equal_to_depth() {
        let layout = ChannelLayout::new(&[5], DepthType::ChannelHot).unwrap();
        let mut cell = vec![0.0; 5];
        assert!(layout.encode(&[4.0], &mut cell, "a").is_ok());
        assert!(layout.encode(&[5.0], &mut cell, "a").is_err());
    }

    #[test]
    fn channel_hot_depth_one_is_passthrough() {
        let layout = ChannelLayout::new(&[3, 1], DepthType::ChannelHot).unwrap();
        let mut cell = layout.default_cell().to_vec();
        layout.encode(&[2.0, 0.75], &mut cell, "a").unwrap();
        assert_eq!(cell, vec![0.0, 0.0, 1.0, 0.75]);
    }

    #[test]
    fn encode_checks_cell_length() {
        let layout = ChannelLayout::new(&[3], DepthType::ChannelHot).unwrap();
        let mut short = vec![0.0; 2];
        assert_eq!(
            layout.encode(&[1.0], &mut short, "a"),
            Err(GridError::ShapeMismatch { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn category_extractor_fills_channel_zero() {
        let mut features = vec![0.0; 2];
        CategoryExtractor.extract(&object(vec![9.0]), 3.0, 0.5, &mut features);
        assert_eq!(features, vec![3.0, 0.0]);
    }

    #[test]
    fn attribute_extractor_pads_and_truncates() {
        let mut features = vec![0.0; 3];
        AttributeExtractor.extract(&object(vec![1.5]), 2.0, 0.5, &mut features);
        assert_eq!(features, vec![2.0, 1.5, 0.0]);

        let mut features = vec![0.0; 2];
        AttributeExtractor.extract(&object(vec![1.0, 2.0, 3.0]), 1.0, 0.5, &mut features);
        assert_eq!(features, vec![1.0, 1.0]);
    }

    #[test]
    fn distance_extractor_reports_distance() {
        let mut features = vec![0.0; 1];
        DistanceExtractor.extract(&object(vec![]), 4.0, 0.3, &mut features);
        assert_eq!(features, vec![0.3]);
    }
}
