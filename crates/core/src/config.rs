use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_DATA_DIR: &str = "NORMATILE_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub tiling: TilingConfig,
    pub dataset: DatasetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw source images, paired by file name across the two folders.
    pub rgb_dir: PathBuf,
    pub normal_dir: PathBuf,
    /// Root of the prepared dataset (training/, testing/, result_<W>/).
    pub dataset_dir: PathBuf,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TilingConfig {
    pub window_size: usize,
    pub shift: usize,
    /// Images larger than this are halved before tiling.
    pub max_dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub train_sample_count: usize,
    pub test_sample_count: usize,
    /// Fraction of training tiles moved into the testing set.
    pub testing_fraction: f64,
    /// Sample tile pairs with replacement when true. The two historical
    /// revisions of the pipeline disagreed; the policy is explicit here.
    pub allow_duplicate_samples: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            tiling: TilingConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            rgb_dir: PathBuf::from("rgb"),
            normal_dir: PathBuf::from("normal"),
            dataset_dir: PathBuf::from("work"),
            model_path: PathBuf::from("models/normal_generator.onnx"),
        }
    }
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            window_size: 32,
            shift: 32,
            max_dimension: 1024,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_sample_count: 1000,
            test_sample_count: 100,
            testing_fraction: 0.2,
            allow_duplicate_samples: false,
        }
    }
}

impl TilingConfig {
    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidParameter {
                name: "tiling.window_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.shift == 0 || self.shift > self.window_size {
            return Err(Error::InvalidParameter {
                name: "tiling.shift".to_string(),
                reason: format!("must be in 1..={}", self.window_size),
            });
        }
        if self.max_dimension < self.window_size {
            return Err(Error::InvalidParameter {
                name: "tiling.max_dimension".to_string(),
                reason: format!("must be at least the window size {}", self.window_size),
            });
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        toml::from_str(&raw).map_err(|e| Error::InvalidParameter {
            name: "config".to_string(),
            reason: format!("failed to parse {}: {e}", path.display()),
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| Error::InvalidParameter {
            name: "config".to_string(),
            reason: "config path does not have a parent directory".to_string(),
        })?;
        fs::create_dir_all(parent).map_err(|source| Error::io(parent, source))?;

        let encoded = toml::to_string_pretty(self).map_err(|e| Error::InvalidParameter {
            name: "config".to_string(),
            reason: format!("failed to serialize config TOML: {e}"),
        })?;
        fs::write(path, encoded).map_err(|source| Error::io(path, source))?;

        Ok(())
    }
}

/// Resolve the data directory with 3-tier priority:
/// 1. CLI override if provided
/// 2. NORMATILE_DATA_DIR environment variable
/// 3. Default: ./data
pub fn data_dir(cli_override: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }

    if let Some(env_dir) = env::var_os(ENV_DATA_DIR) {
        return PathBuf::from(env_dir);
    }

    PathBuf::from("data")
}

/// Returns the path to config.toml within the given data directory.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Initialize the data directory structure on first run:
/// - Creates data_dir if missing
/// - Writes default config.toml only if file doesn't exist
pub fn initialize_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir).map_err(|source| Error::io(data_dir, source))?;
    }

    let cfg_path = config_path(data_dir);
    if !cfg_path.exists() {
        AppConfig::default().save_to_path(&cfg_path)?;
    }

    Ok(())
}

/// Resolve a path relative to a base directory.
/// Returns the path as-is if absolute, otherwise joins it to base.
pub fn resolve_relative_to(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
