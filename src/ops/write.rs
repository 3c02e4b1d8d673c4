//! Chunked scatter writes of per-token KV vectors into block caches.
//!
//! The scatter primitive refuses more indices than the cache's total slot
//! capacity in a single call. That limit can be exceeded under heavy
//! padding or warmup with an undersized cache, so writes are split into
//! capacity-sized passes applied strictly in slot-mapping order. Chunking
//! must not change the logical result of the write: each pass is
//! last-write-wins for duplicate addresses, and pass ordering extends that
//! to the whole mapping.

use tracing::debug;

use crate::ops::addressing::{prepare_addressing, AddressPlan};
use crate::tensor::{CacheTensor, Element, TensorError};

/// Write per-token key and value rows into their mapped cache slots.
///
/// `key`/`value` are `[num_tokens, ...feature_dims]` row tensors,
/// positionally aligned with `slot_mapping`. Both caches are mutated in
/// place. Out-of-range addresses and feature-dim disagreements surface
/// unchanged from the scatter primitive.
pub fn write_kv<T: Element>(
    key: &CacheTensor<T>,
    value: &CacheTensor<T>,
    key_cache: &mut CacheTensor<T>,
    value_cache: &mut CacheTensor<T>,
    slot_mapping: &[usize],
) -> Result<(), TensorError> {
    let plan = prepare_addressing(key_cache, slot_mapping);
    apply_write(key, key_cache, &plan)?;
    apply_write(value, value_cache, &plan)?;
    Ok(())
}

/// Apply one tensor's rows using a previously prepared addressing plan.
///
/// Issues one scatter call per pass, in slot-mapping order. A pass covers
/// at most `plan.capacity` slots, the most the primitive can address in a
/// single call. Sequential pass ordering preserves last-write-wins across
/// the entire mapping.
pub fn apply_write<T: Element>(
    input: &CacheTensor<T>,
    cache: &mut CacheTensor<T>,
    plan: &AddressPlan,
) -> Result<(), TensorError> {
    let total = plan.block_indices.len();
    if plan.num_passes > 1 {
        debug!(
            passes = plan.num_passes,
            requested = total,
            capacity = plan.capacity,
            "chunked cache write"
        );
    }

    for pass in 0..plan.num_passes {
        let start = pass * plan.capacity;
        let end = ((pass + 1) * plan.capacity).min(total);
        cache.index_put(
            &plan.block_indices[start..end],
            &plan.block_offsets[start..end],
            input.narrow(start, end - start)?,
        )?;
    }
    Ok(())
}
