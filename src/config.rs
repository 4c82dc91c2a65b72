//! Configuration
//!
//! Coding parameters and tuning knobs for encode/read runs. A config can be
//! loaded from a YAML or JSON file; every field is optional and falls back to
//! [`EcConfig::default`]. The binary layers CLI flags on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ec::geometry::EcGeometry;
use crate::ec::reconstruction::ShardSelection;
use crate::error::{Error, Result};

/// Default number of data shards
pub const DEFAULT_DATA_SHARDS: usize = 10;

/// Default number of parity shards
pub const DEFAULT_PARITY_SHARDS: usize = 4;

/// Default large block size (1 GiB)
pub const DEFAULT_LARGE_BLOCK_SIZE: u64 = 1024 * 1024 * 1024;

/// Default small block size (1 MiB)
pub const DEFAULT_SMALL_BLOCK_SIZE: u64 = 1024 * 1024;

/// Default per-block buffer used while encoding (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Erasure coding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcConfig {
    /// Number of data shards (N)
    pub data_shards: usize,

    /// Number of parity shards (M)
    pub parity_shards: usize,

    /// Large block size in bytes (L)
    pub large_block_size: u64,

    /// Small block size in bytes (S)
    pub small_block_size: u64,

    /// Bytes of each block encoded per codec call
    pub buffer_size: usize,

    /// Worker threads for encoding and verification
    pub workers: usize,

    /// How surviving shards are picked for reconstruction
    pub selection: ShardSelection,
}

impl Default for EcConfig {
    fn default() -> Self {
        Self {
            data_shards: DEFAULT_DATA_SHARDS,
            parity_shards: DEFAULT_PARITY_SHARDS,
            large_block_size: DEFAULT_LARGE_BLOCK_SIZE,
            small_block_size: DEFAULT_SMALL_BLOCK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: 1,
            selection: ShardSelection::LowestIndexed,
        }
    }
}

impl EcConfig {
    /// Load a config file; `.json` files are parsed as JSON, anything else
    /// as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Ok(serde_json::from_str(&text)?)
        } else {
            Self::from_yaml(&text)
        }
    }

    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("invalid YAML config: {}", e)))
    }

    /// Validated geometry for these parameters
    pub fn geometry(&self) -> Result<EcGeometry> {
        EcGeometry::new(
            self.data_shards,
            self.parity_shards,
            self.large_block_size,
            self.small_block_size,
        )
    }

    /// Check the tuning knobs as well as the geometry
    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be greater than 0".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be greater than 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EcConfig::default();
        assert_eq!(config.data_shards, 10);
        assert_eq!(config.parity_shards, 4);
        assert!(config.validate().is_ok());

        let geometry = config.geometry().unwrap();
        assert_eq!(geometry.total_shards(), 14);
    }

    #[test]
    fn test_partial_yaml() {
        let config = EcConfig::from_yaml(
            "data_shards: 4\nparity_shards: 2\nlarge_block_size: 4096\nsmall_block_size: 64\n",
        )
        .unwrap();

        assert_eq!(config.data_shards, 4);
        assert_eq!(config.large_block_size, 4096);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.selection, ShardSelection::LowestIndexed);
    }

    #[test]
    fn test_selection_parsing() {
        let config = EcConfig::from_yaml("selection: lowest_indexed\n").unwrap();
        assert_eq!(config.selection, ShardSelection::LowestIndexed);

        let config: EcConfig = serde_json::from_str(r#"{"selection": {"seeded": 42}}"#).unwrap();
        assert_eq!(config.selection, ShardSelection::Seeded(42));
    }

    #[test]
    fn test_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"data_shards": 6, "parity_shards": 3, "workers": 4}}"#).unwrap();

        let config = EcConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data_shards, 6);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_invalid_values() {
        let config = EcConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = EcConfig {
            small_block_size: DEFAULT_LARGE_BLOCK_SIZE,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidEcConfig(_))));

        assert!(matches!(
            EcConfig::from_yaml("data_shards: [1"),
            Err(Error::Config(_))
        ));
    }
}
