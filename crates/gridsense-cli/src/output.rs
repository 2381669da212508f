//! Artefacts written by `gridsense perceive --out <dir>`.
//!
//! ```text
//! <dir>/
//!   manifest.json   – run id, timestamp, shape and block list
//!   tensor.json     – raw tensor, top row first
//!   block_0.png …   – three-channel image blocks (PNG compression only)
//! ```

use chrono::{DateTime, Utc};
use gridsense_perception::{GridSensor, PngCodec};
use gridsense_types::CompressionType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// `(height, width, depth)` of the tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub height: usize,
    pub width: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: ShapeRecord,
    pub data: Vec<f32>,
}

/// Summary of one written observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sensor: String,
    pub shape: ShapeRecord,
    pub compression: CompressionType,
    /// File names of the image blocks, in channel order.
    pub blocks: Vec<String>,
    pub channels_on_last_block: usize,
    pub occupied_cells: usize,
}

/// Write the sensor's current observation into `dir`.
pub fn write_observation(
    dir: &Path,
    sensor: &GridSensor,
    occupied_cells: usize,
) -> Result<Manifest, String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create output directory {}: {}", dir.display(), e))?;

    let shape = sensor.shape();
    let record = ShapeRecord {
        height: shape.height,
        width: shape.width,
        depth: shape.depth,
    };

    let mut blocks = Vec::new();
    let mut channels_on_last_block = 0;
    if sensor.compression_type() == CompressionType::Png {
        let compressed = sensor.serialize(&PngCodec).map_err(|e| e.to_string())?;
        for (i, bytes) in compressed.blocks().enumerate() {
            let name = format!("block_{i}.png");
            write_file(&dir.join(&name), bytes)?;
            debug!(block = i, bytes = bytes.len(), "wrote image block");
            blocks.push(name);
        }
        channels_on_last_block = compressed.channels_on_last_block;
    }

    let tensor = TensorRecord {
        shape: record,
        data: sensor.raw_tensor(),
    };
    let raw = serde_json::to_string(&tensor).map_err(|e| format!("Failed to serialize tensor: {}", e))?;
    write_file(&dir.join("tensor.json"), raw.as_bytes())?;

    let manifest = Manifest {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        sensor: sensor.name().to_string(),
        shape: record,
        compression: sensor.compression_type(),
        blocks,
        channels_on_last_block,
        occupied_cells,
    };
    let raw = serde_json::to_string_pretty(&manifest)
        .map_err(|e| format!("Failed to serialize manifest: {}", e))?;
    write_file(&dir.join("manifest.json"), raw.as_bytes())?;

    Ok(manifest)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    fs::write(path, bytes).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}
