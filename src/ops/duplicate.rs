//! Copy-on-write block duplication across parallel cache tensors.

use tracing::debug;

use crate::tensor::{CacheTensor, Element, TensorError};

/// Copy whole blocks from source rows to destination rows, in place, for
/// every key/value cache pair in the parallel per-layer sequences.
///
/// Realizes copy-on-write fan-out: a shared block is duplicated so each
/// logical sequence (e.g. a beam-search branch) gets an independent
/// mutable copy. One batched gather + write per tensor, not chunked:
/// the pair count is scheduler-bounded. An empty mapping is a no-op. A
/// single execution boundary is marked after all tensors are updated, and
/// only for accelerator-resident caches, so subsequent reads of the
/// destination blocks observe completed writes.
pub fn duplicate_blocks<T: Element>(
    key_caches: &mut [CacheTensor<T>],
    value_caches: &mut [CacheTensor<T>],
    block_mapping: &[(usize, usize)],
) -> Result<(), TensorError> {
    if block_mapping.is_empty() {
        return Ok(());
    }

    let src_indices: Vec<usize> = block_mapping.iter().map(|&(s, _)| s).collect();
    let dst_indices: Vec<usize> = block_mapping.iter().map(|&(_, d)| d).collect();

    for (key_cache, value_cache) in key_caches.iter_mut().zip(value_caches.iter_mut()) {
        let rows = key_cache.index_select(&src_indices)?;
        key_cache.index_copy(&dst_indices, rows.view())?;

        let rows = value_cache.index_select(&src_indices)?;
        value_cache.index_copy(&dst_indices, rows.view())?;
    }

    debug!(
        blocks = block_mapping.len(),
        layers = key_caches.len(),
        "duplicated blocks"
    );

    if let Some(cache) = key_caches.first() {
        if cache.device().is_accelerator() {
            cache.device().mark_step();
        }
    }
    Ok(())
}
