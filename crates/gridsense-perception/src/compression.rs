//! Image-block compression of the perception buffer.
//!
//! The buffer is cut into blocks of three consecutive channels.  Each block
//! becomes one `grid_num_side_x × grid_num_side_z` RGB image whose pixel
//! `(x, y)` carries cell `y * grid_num_side_x + x`; the last block is
//! zero-padded when the channel count is not a multiple of three.  Values are
//! clamped to `[0, 1]` and quantised to `round(v * 255)`.
//!
//! # Example
//!
//! ```rust
//! use gridsense_perception::compression::{encode_blocks, ObservationShape, PngCodec};
//!
//! let shape = ObservationShape { width: 2, height: 2, depth: 4 };
//! let buffer: Vec<f32> = (0..16).map(|i| (i % 2) as f32).collect();
//!
//! let compressed = encode_blocks(&buffer, shape, &PngCodec).unwrap();
//! assert_eq!(compressed.block_lengths.len(), 2);
//! assert_eq!(compressed.channels_on_last_block, 1);
//! assert_eq!(compressed.decode(&PngCodec).unwrap(), buffer);
//! ```

use std::io::Cursor;

use gridsense_types::GridError;
use image::{ImageFormat, RgbImage};

/// Channels carried by one image block.
pub const CHANNELS_PER_BLOCK: usize = 3;

// ────────────────────────────────────────────────────────────────────────────
// Shape and block layout
// ────────────────────────────────────────────────────────────────────────────

/// Dimensions of the observation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationShape {
    /// Cells along x (`grid_num_side_x`).
    pub width: usize,
    /// Cells along z (`grid_num_side_z`).
    pub height: usize,
    /// Values per cell (`observation_per_cell`).
    pub depth: usize,
}

impl ObservationShape {
    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    /// Total number of values in the tensor.
    pub fn len(&self) -> usize {
        self.num_cells() * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How `depth` channels split into image blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub num_blocks: usize,
    /// Meaningful channels in the final block (1..=3).
    pub channels_on_last_block: usize,
}

impl BlockLayout {
    pub fn new(depth: usize) -> Self {
        let num_blocks = depth.div_ceil(CHANNELS_PER_BLOCK);
        let channels_on_last_block = match depth % CHANNELS_PER_BLOCK {
            0 if depth > 0 => CHANNELS_PER_BLOCK,
            rest => rest,
        };
        Self {
            num_blocks,
            channels_on_last_block,
        }
    }
}

/// Clamp to `[0, 1]` and scale to a byte.  NaN maps to 0.
pub fn quantize(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn dequantize(byte: u8) -> f32 {
    byte as f32 / 255.0
}

// ────────────────────────────────────────────────────────────────────────────
// ImageCodec
// ────────────────────────────────────────────────────────────────────────────

/// A decoded RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbBlock {
    pub width: u32,
    pub height: u32,
    /// Row-major pixels, `width * height` long.
    pub pixels: Vec<[u8; 3]>,
}

/// Encoder/decoder for one three-channel image block.
pub trait ImageCodec {
    fn encode_block(&self, width: u32, height: u32, pixels: &[[u8; 3]]) -> Result<Vec<u8>, GridError>;

    fn decode_block(&self, bytes: &[u8]) -> Result<RgbBlock, GridError>;
}

/// Lossless PNG codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn encode_block(&self, width: u32, height: u32, pixels: &[[u8; 3]]) -> Result<Vec<u8>, GridError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(GridError::ShapeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let image = RgbImage::from_raw(width, height, pixels.concat())
            .ok_or_else(|| GridError::Codec("pixel buffer does not match image size".to_string()))?;

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| GridError::Codec(format!("failed to encode PNG: {e}")))?;
        Ok(bytes)
    }

    fn decode_block(&self, bytes: &[u8]) -> Result<RgbBlock, GridError> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| GridError::Codec(format!("failed to decode PNG: {e}")))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        Ok(RgbBlock {
            width,
            height,
            pixels: image.pixels().map(|p| p.0).collect(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CompressedObservation
// ────────────────────────────────────────────────────────────────────────────

/// Concatenated image blocks of one perception cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedObservation {
    pub shape: ObservationShape,
    /// Every encoded block, back to back.
    pub data: Vec<u8>,
    /// Byte length of each block in `data`.
    pub block_lengths: Vec<usize>,
    /// Meaningful channels in the final block.
    pub channels_on_last_block: usize,
}

impl CompressedObservation {
    /// The encoded bytes of each block, in order.
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> {
        let mut start = 0;
        self.block_lengths.iter().map(move |&len| {
            let block = &self.data[start..start + len];
            start += len;
            block
        })
    }

    /// Rebuild the perception buffer.
    ///
    /// Exact for values that are multiples of `1 / 255`; other values come
    /// back rounded to the nearest one.
    pub fn decode(&self, codec: &dyn ImageCodec) -> Result<Vec<f32>, GridError> {
        let total: usize = self.block_lengths.iter().sum();
        if total != self.data.len() {
            return Err(GridError::ShapeMismatch {
                expected: total,
                actual: self.data.len(),
            });
        }

        let cells = self.shape.num_cells();
        let depth = self.shape.depth;
        let mut buffer = vec![0.0; self.shape.len()];

        for (block_index, bytes) in self.blocks().enumerate() {
            let block = codec.decode_block(bytes)?;
            if block.width as usize != self.shape.width
                || block.height as usize != self.shape.height
                || block.pixels.len() != cells
            {
                return Err(GridError::ShapeMismatch {
                    expected: cells,
                    actual: block.pixels.len(),
                });
            }
            for (cell, pixel) in block.pixels.iter().enumerate() {
                for (k, &byte) in pixel.iter().enumerate() {
                    let channel = block_index * CHANNELS_PER_BLOCK + k;
                    if channel < depth {
                        buffer[cell * depth + channel] = dequantize(byte);
                    }
                }
            }
        }
        Ok(buffer)
    }
}

/// Cut `buffer` into three-channel blocks and encode each one with `codec`.
///
/// # Errors
///
/// [`GridError::ShapeMismatch`] when `buffer` does not hold `shape.len()`
/// values, or whatever the codec reports.
pub fn encode_blocks(
    buffer: &[f32],
    shape: ObservationShape,
    codec: &dyn ImageCodec,
) -> Result<CompressedObservation, GridError> {
    if buffer.len() != shape.len() {
        return Err(GridError::ShapeMismatch {
            expected: shape.len(),
            actual: buffer.len(),
        });
    }
    let layout = BlockLayout::new(shape.depth);
    let width = u32::try_from(shape.width).map_err(|_| GridError::Codec("grid too wide".to_string()))?;
    let height = u32::try_from(shape.height).map_err(|_| GridError::Codec("grid too deep".to_string()))?;

    let mut data = Vec::new();
    let mut block_lengths = Vec::with_capacity(layout.num_blocks);
    let mut pixels = vec![[0u8; 3]; shape.num_cells()];

    for block in 0..layout.num_blocks {
        let first = block * CHANNELS_PER_BLOCK;
        for (cell, pixel) in pixels.iter_mut().enumerate() {
            let values = &buffer[cell * shape.depth..(cell + 1) * shape.depth];
            for (k, slot) in pixel.iter_mut().enumerate() {
                *slot = values.get(first + k).copied().map_or(0, quantize);
            }
        }
        let bytes = codec.encode_block(width, height, &pixels)?;
        block_lengths.push(bytes.len());
        data.extend_from_slice(&bytes);
    }

    Ok(CompressedObservation {
        shape,
        data,
        block_lengths,
        channels_on_last_block: layout.channels_on_last_block,
    })
}
