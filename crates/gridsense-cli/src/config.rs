//! Configuration Vault – reads/writes `~/.gridsense/config.toml`.

use gridsense_types::{DepthType, GridConfiguration};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.gridsense/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory `perceive` writes its artefacts to when `--out` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// Sensor settings, written as the `[sensor]` table.
    #[serde(default = "default_sensor")]
    pub sensor: GridConfiguration,
}

fn default_sensor() -> GridConfiguration {
    GridConfiguration {
        channel_depth: vec![3],
        detectable_tags: vec!["food".to_string(), "wall".to_string()],
        ..Default::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            sensor: default_sensor(),
        }
    }
}

/// Return the path to `~/.gridsense/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gridsense").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Parse a config document without applying environment overrides.
pub(crate) fn parse(raw: &str) -> Result<Config, String> {
    toml::from_str(raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `GRIDSENSE_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `GRIDSENSE_DEPTH_TYPE` | `sensor.depth_type` (`channel` / `channel_hot`) |
/// | `GRIDSENSE_CELL_SCALE` | `sensor.cell_scale_x` and `sensor.cell_scale_z` |
/// | `GRIDSENSE_GRID_SIZE` | `sensor.grid_num_side_x` and `sensor.grid_num_side_z` |
/// | `GRIDSENSE_OUTPUT_DIR` | `output_dir` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GRIDSENSE_DEPTH_TYPE")
        && let Ok(depth_type) = v.parse::<DepthType>() {
            cfg.sensor.depth_type = depth_type;
        }
    if let Ok(v) = std::env::var("GRIDSENSE_CELL_SCALE")
        && let Ok(scale) = v.parse::<f32>() {
            cfg.sensor.cell_scale_x = scale;
            cfg.sensor.cell_scale_z = scale;
        }
    if let Ok(v) = std::env::var("GRIDSENSE_GRID_SIZE")
        && let Ok(side) = v.parse::<usize>() {
            cfg.sensor.grid_num_side_x = side;
            cfg.sensor.grid_num_side_z = side;
        }
    if let Ok(v) = std::env::var("GRIDSENSE_OUTPUT_DIR") {
        cfg.output_dir = Some(v);
    }
}

/// Save the config to disk, creating `~/.gridsense/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
