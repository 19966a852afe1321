//! Configuration for pagekv
//!
//! Centralized configuration with sensible defaults. Engines take the
//! values they need explicitly at construction time.

use std::path::PathBuf;

use crate::error::{PageKvError, Result};

/// Chunk size used when a stream is created without an explicit one
pub const DEFAULT_CHUNK_SIZE: u32 = 1024;

/// Node order used when an index is created without an explicit one
pub const DEFAULT_INDEX_ORDER: u32 = 32;

/// Smallest order an index node may have
pub const MIN_INDEX_ORDER: u32 = 2;

/// Main configuration for a pagekv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Stream Configuration
    // -------------------------------------------------------------------------
    /// Segment size (in bytes) for newly created streams
    pub default_chunk_size: u32,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Maximum keys per node for newly created indexes
    pub index_order: u32,

    // -------------------------------------------------------------------------
    // Backing Cache Configuration
    // -------------------------------------------------------------------------
    /// Root directory used by the file-backed cache
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── _default/        (entries without a namespace)
    ///     └── ns_{hex}/        (one directory per namespace)
    pub data_dir: PathBuf,

    /// Namespace used by the CLI and helpers when none is given
    pub region: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            index_order: DEFAULT_INDEX_ORDER,
            data_dir: PathBuf::from("./pagekv_data"),
            region: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engines cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.default_chunk_size == 0 {
            return Err(PageKvError::Config(
                "default_chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.index_order < MIN_INDEX_ORDER {
            return Err(PageKvError::Config(format!(
                "index_order must be at least {}, got {}",
                MIN_INDEX_ORDER, self.index_order
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the segment size for new streams (in bytes)
    pub fn default_chunk_size(mut self, size: u32) -> Self {
        self.config.default_chunk_size = size;
        self
    }

    /// Set the node order for new indexes
    pub fn index_order(mut self, order: u32) -> Self {
        self.config.index_order = order;
        self
    }

    /// Set the data directory (root for the file-backed cache)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the default namespace
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
