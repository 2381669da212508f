use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Hard ceiling on the encoded width of a single cell.
///
/// Compressed observations carry three channels per image block and the
/// block count must fit in one byte, so a cell may hold at most
/// `255 * 3 - 1` values.
pub const MAX_OBSERVATION_PER_CELL: usize = 255 * 3;

/// Stable identity of an object living in the spatial index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub Uuid);

impl ObjectId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-bit category/layer filter applied to every spatial query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// Matches every layer.
    pub const ALL: LayerMask = LayerMask(u32::MAX);
    /// Matches nothing.
    pub const NONE: LayerMask = LayerMask(0);

    /// Build a mask from a list of layer numbers (`0..32`).  Out-of-range
    /// layers are ignored.
    pub fn from_layers(layers: &[u8]) -> Self {
        Self(
            layers
                .iter()
                .filter(|&&l| l < 32)
                .fold(0u32, |acc, &l| acc | (1 << l)),
        )
    }

    /// True when `layer` is selected by this mask.
    pub fn contains(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Linear RGBA colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same colour with a different alpha.
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Layout of the per-cell values in the perception buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepthType {
    /// Each channel is one value normalised by its depth.
    #[default]
    Channel,
    /// Each channel is a one-hot span of `depth` values (or a raw scalar
    /// when the depth is 1).
    ChannelHot,
}

impl std::fmt::Display for DepthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepthType::Channel => write!(f, "channel"),
            DepthType::ChannelHot => write!(f, "channel_hot"),
        }
    }
}

impl std::str::FromStr for DepthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "channel" => Ok(DepthType::Channel),
            "channel_hot" | "channelhot" => Ok(DepthType::ChannelHot),
            other => Err(format!("unknown depth type '{other}'")),
        }
    }
}

/// How observations are handed to the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Raw float tensor only.
    None,
    /// Three-channel PNG blocks.
    #[default]
    Png,
}

/// Full, immutable description of a grid sensor.
///
/// Every field has a default so partial TOML/JSON documents deserialise.
/// Call [`GridConfiguration::validate`] (done automatically when a sensor is
/// built) to enforce the accepted ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GridConfiguration {
    /// Sensor name reported to the consumer.
    pub name: String,
    /// Width of each cell (x axis).
    pub cell_scale_x: f32,
    /// Height of the query volume of each cell (y axis).
    pub cell_scale_y: f32,
    /// Depth of each cell (z axis).
    pub cell_scale_z: f32,
    /// Number of cells along x.
    pub grid_num_side_x: usize,
    /// Number of cells along z.
    pub grid_num_side_z: usize,
    /// Rotate the grid with the observer's facing.
    pub rotate_to_agent: bool,
    /// Cardinality of each channel; 1 means an already-normalised scalar.
    pub channel_depth: Vec<u32>,
    /// Detectable category tags.  An object tagged `detectable_tags[i]` is
    /// reported with category `i + 1`; 0 means "empty".
    pub detectable_tags: Vec<String>,
    /// Layers considered by the spatial query.
    pub observe_mask: LayerMask,
    pub depth_type: DepthType,
    pub compression: CompressionType,
    /// Starting capacity of the per-cell candidate buffer.
    pub initial_candidate_buffer_size: usize,
    /// The candidate buffer never grows beyond this many entries.
    pub max_candidate_buffer_size: usize,
    /// Optional debug colour per detectable tag.
    pub debug_colors: Vec<Rgba>,
}

impl Default for GridConfiguration {
    fn default() -> Self {
        Self {
            name: "GridSensor".to_string(),
            cell_scale_x: 1.0,
            cell_scale_y: 0.01,
            cell_scale_z: 1.0,
            grid_num_side_x: 16,
            grid_num_side_z: 16,
            rotate_to_agent: false,
            channel_depth: vec![1],
            detectable_tags: Vec::new(),
            observe_mask: LayerMask::ALL,
            depth_type: DepthType::Channel,
            compression: CompressionType::Png,
            initial_candidate_buffer_size: 4,
            max_candidate_buffer_size: 500,
            debug_colors: Vec::new(),
        }
    }
}

impl GridConfiguration {
    /// Number of cells in the grid.
    pub fn num_cells(&self) -> usize {
        self.grid_num_side_x * self.grid_num_side_z
    }

    /// Number of encoded values per cell under the configured depth type.
    pub fn observation_per_cell(&self) -> usize {
        match self.depth_type {
            DepthType::Channel => self.channel_depth.len(),
            DepthType::ChannelHot => self.channel_depth.iter().map(|&d| d as usize).sum(),
        }
    }

    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfiguration`] naming the first field
    /// that is out of range.
    pub fn validate(&self) -> Result<(), GridError> {
        check_range("cell_scale_x", self.cell_scale_x, 0.05, 1000.0)?;
        check_range("cell_scale_y", self.cell_scale_y, 0.01, 1000.0)?;
        check_range("cell_scale_z", self.cell_scale_z, 0.05, 1000.0)?;
        check_range("grid_num_side_x", self.grid_num_side_x, 2, 2000)?;
        check_range("grid_num_side_z", self.grid_num_side_z, 2, 2000)?;

        if self.channel_depth.is_empty() {
            return Err(GridError::InvalidConfiguration {
                field: "channel_depth".to_string(),
                details: "at least one channel is required".to_string(),
            });
        }
        if let Some(i) = self.channel_depth.iter().position(|&d| d == 0) {
            return Err(GridError::InvalidConfiguration {
                field: "channel_depth".to_string(),
                details: format!("channel {i} has depth 0; depths must be >= 1"),
            });
        }
        if self.initial_candidate_buffer_size == 0 {
            return Err(GridError::InvalidConfiguration {
                field: "initial_candidate_buffer_size".to_string(),
                details: "must be >= 1".to_string(),
            });
        }
        if self.max_candidate_buffer_size == 0 {
            return Err(GridError::InvalidConfiguration {
                field: "max_candidate_buffer_size".to_string(),
                details: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), GridError>
where
    T: PartialOrd + std::fmt::Display,
{
    // NaN fails both comparisons and is rejected.
    if !(value >= min && value <= max) {
        return Err(GridError::InvalidConfiguration {
            field: field.to_string(),
            details: format!("{value} is outside [{min}, {max}]"),
        });
    }
    Ok(())
}

/// Global error type for grid sensor setup, encoding and serialisation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridError {
    #[error("Invalid configuration for {field}: {details}")]
    InvalidConfiguration { field: String, details: String },

    #[error(
        "Too many channels per cell: {observation_per_cell} (must be less than {})",
        MAX_OBSERVATION_PER_CELL
    )]
    TooManyChannels { observation_per_cell: usize },

    #[error("Channel {channel} value for '{object}' is out of range: {value} (expected 0..={depth})")]
    ValueOutOfRange {
        channel: usize,
        object: String,
        value: f32,
        depth: u32,
    },

    #[error("Image codec error: {0}")]
    Codec(String),

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let cfg = GridConfiguration::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.num_cells(), 256);
        assert_eq!(cfg.observation_per_cell(), 1);
    }

    #[test]
    fn observation_per_cell_depends_on_depth_type() {
        let mut cfg = GridConfiguration {
            channel_depth: vec![5, 3, 1],
            ..Default::default()
        };
        assert_eq!(cfg.observation_per_cell(), 3);
        cfg.depth_type = DepthType::ChannelHot;
        assert_eq!(cfg.observation_per_cell(), 9);
    }

    #[test]
    fn validate_rejects_out_of_range_scale() {
        let cfg = GridConfiguration {
            cell_scale_x: 0.01,
            ..Default::default()
        };
        match cfg.validate() {
            Err(GridError::InvalidConfiguration { field, .. }) => assert_eq!(field, "cell_scale_x"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_nan_scale() {
        let cfg = GridConfiguration {
            cell_scale_z: f32::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_tiny_grid() {
        let cfg = GridConfiguration {
            grid_num_side_z: 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_and_zero_depths() {
        let empty = GridConfiguration {
            channel_depth: vec![],
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let zero = GridConfiguration {
            channel_depth: vec![3, 0],
            ..Default::default()
        };
        let err = zero.validate().unwrap_err();
        assert!(err.to_string().contains("channel 1"));
    }

    #[test]
    fn validate_rejects_empty_candidate_buffer() {
        let cfg = GridConfiguration {
            initial_candidate_buffer_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn layer_mask_membership() {
        let mask = LayerMask::from_layers(&[0, 3, 40]);
        assert!(mask.contains(0));
        assert!(mask.contains(3));
        assert!(!mask.contains(1));
        assert!(!mask.contains(40));
        assert!(LayerMask::ALL.contains(31));
        assert!(!LayerMask::NONE.contains(0));
    }

    #[test]
    fn depth_type_parses_both_spellings() {
        assert_eq!("channel".parse::<DepthType>().unwrap(), DepthType::Channel);
        assert_eq!("ChannelHot".parse::<DepthType>().unwrap(), DepthType::ChannelHot);
        assert_eq!("channel_hot".parse::<DepthType>().unwrap(), DepthType::ChannelHot);
        assert!("voxel".parse::<DepthType>().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: GridConfiguration = toml::from_str(
            r#"
            grid_num_side_x = 8
            depth_type = "channel_hot"
            channel_depth = [4, 1]
            detectable_tags = ["food", "wall"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.grid_num_side_x, 8);
        assert_eq!(cfg.grid_num_side_z, 16);
        assert_eq!(cfg.depth_type, DepthType::ChannelHot);
        assert_eq!(cfg.observe_mask, LayerMask::ALL);
        assert_eq!(cfg.compression, CompressionType::Png);
    }

    #[test]
    fn configuration_json_roundtrip() {
        let cfg = GridConfiguration {
            debug_colors: vec![Rgba::new(1.0, 0.0, 0.0, 1.0)],
            observe_mask: LayerMask::from_layers(&[2]),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: GridConfiguration = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn grid_error_display() {
        let err = GridError::ValueOutOfRange {
            channel: 2,
            object: "crate-7".to_string(),
            value: 6.0,
            depth: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("Channel 2"));
        assert!(msg.contains("crate-7"));
        assert!(msg.contains('6'));

        let err = GridError::TooManyChannels {
            observation_per_cell: 800,
        };
        assert!(err.to_string().contains("765"));
    }
}
