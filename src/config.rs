//! Cache geometry configuration.
//!
//! Describes the block-organized KV cache the engine allocates for one
//! layer: block count, tokens per block, head layout, and element type.
//! Sizing helpers derive byte budgets from the geometry, and
//! [`CacheConfig::allocate_kv_pair`] builds the zeroed key/value tensor
//! pair the cache ops operate on.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::tensor::{CacheTensor, DType, Element};

/// Geometry of one layer's key/value cache pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of blocks in the cache.
    pub num_blocks: usize,

    /// Tokens per block.
    pub block_size: usize,

    /// Number of KV heads (GQA/MQA).
    pub num_kv_heads: usize,

    /// Head dimension.
    pub head_dim: usize,

    /// Element type of the cache.
    pub dtype: DType,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_blocks: 512,
            block_size: 16,
            num_kv_heads: 8,
            head_dim: 128,
            dtype: DType::F16,
        }
    }
}

impl CacheConfig {
    /// Load a configuration from a JSON file, falling back to defaults if
    /// the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }

    /// Reject geometries the cache ops cannot address.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.num_blocks > 0, "num_blocks must be non-zero");
        anyhow::ensure!(self.block_size > 0, "block_size must be non-zero");
        anyhow::ensure!(self.num_kv_heads > 0, "num_kv_heads must be non-zero");
        anyhow::ensure!(self.head_dim > 0, "head_dim must be non-zero");
        Ok(())
    }

    /// Shape of one cache tensor:
    /// `[num_blocks, block_size, num_kv_heads, head_dim]`.
    pub fn cache_shape(&self) -> Vec<usize> {
        vec![
            self.num_blocks,
            self.block_size,
            self.num_kv_heads,
            self.head_dim,
        ]
    }

    /// Total addressable slots, `num_blocks * block_size`.
    pub fn num_slots(&self) -> usize {
        self.num_blocks * self.block_size
    }

    /// Bytes for one block, K and V together.
    pub fn kv_block_bytes(&self) -> usize {
        self.block_size * self.num_kv_heads * self.head_dim * self.dtype.size_in_bytes() * 2
    }

    /// How many whole blocks fit in a byte budget.
    pub fn num_blocks_for_budget(&self, budget_bytes: usize) -> usize {
        let block_bytes = self.kv_block_bytes();
        if block_bytes == 0 {
            return 0;
        }
        budget_bytes / block_bytes
    }

    /// Allocate the zero-filled key/value cache tensor pair on `device`.
    pub fn allocate_kv_pair<T: Element>(
        &self,
        device: Arc<Device>,
    ) -> (CacheTensor<T>, CacheTensor<T>) {
        let shape = self.cache_shape();
        (
            CacheTensor::zeros(&shape, device.clone()),
            CacheTensor::zeros(&shape, device),
        )
    }
}
