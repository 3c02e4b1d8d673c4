//! Slot-address translation for block-organized caches.
//!
//! A slot mapping names one flat destination address per token. The cache
//! stores rows by `(block, offset)`, so every operation starts by splitting
//! each slot into those two coordinates. Translation is pure and recomputed
//! per call; nothing here touches tensor contents.

use crate::tensor::{CacheTensor, Element};

/// Split flat slot addresses into aligned block-index and offset vectors.
///
/// `block[i] = slot[i] / block_size`, `offset[i] = slot[i] % block_size`.
/// `block_size` must be non-zero.
pub fn translate_slots(slot_mapping: &[usize], block_size: usize) -> (Vec<usize>, Vec<usize>) {
    let mut blocks = Vec::with_capacity(slot_mapping.len());
    let mut offsets = Vec::with_capacity(slot_mapping.len());
    for &slot in slot_mapping {
        blocks.push(slot / block_size);
        offsets.push(slot % block_size);
    }
    (blocks, offsets)
}

/// A translated addressing plan, reusable across every tensor that shares
/// the same slot mapping (e.g. the key and value caches of each layer).
#[derive(Debug, Clone)]
pub struct AddressPlan {
    /// Scatter passes needed to apply the full mapping.
    pub num_passes: usize,
    /// Slots addressable per pass (the cache's total slot capacity).
    pub capacity: usize,
    /// Per-token destination block indices.
    pub block_indices: Vec<usize>,
    /// Per-token intra-block offsets.
    pub block_offsets: Vec<usize>,
}

/// Translate a slot mapping against a cache's geometry.
///
/// The scatter primitive cannot address more slots than the cache holds in
/// one call, so mappings longer than `num_slots` are applied in
/// `ceil(len / num_slots)` consecutive passes. The returned plan carries
/// everything [`crate::ops::write::apply_write`] needs to do that.
pub fn prepare_addressing<T: Element>(
    cache: &CacheTensor<T>,
    slot_mapping: &[usize],
) -> AddressPlan {
    let capacity = cache.num_slots();
    let (block_indices, block_offsets) = translate_slots(slot_mapping, cache.block_size());
    let num_passes = if capacity == 0 {
        0
    } else {
        slot_mapping.len().div_ceil(capacity)
    };
    AddressPlan {
        num_passes,
        capacity,
        block_indices,
        block_offsets,
    }
}
