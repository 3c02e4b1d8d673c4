//! Whole-block relocation between cache tensors (swap-out / swap-in).

use tracing::debug;

use crate::tensor::{CacheTensor, Element, TensorError};

/// Move whole blocks from `src` rows into `dst` rows per the mapping of
/// `(source_block, destination_block)` pairs.
///
/// Used when blocks are swapped between a resident cache and its
/// secondary-storage counterpart. The move is one batched gather plus one
/// batched write, not chunked: the per-step move count is bounded by the
/// scheduler's block budget, not by cache capacity. An empty mapping is a
/// no-op and issues no synchronization. Otherwise the destination device
/// is synchronized before returning, because relocated blocks are commonly
/// reused by compute immediately after the call.
///
/// A destination index must appear at most once per call; source and
/// destination index validity is checked by the underlying primitives.
pub fn relocate_blocks<T: Element>(
    dst: &mut CacheTensor<T>,
    src: &CacheTensor<T>,
    block_mapping: &[(usize, usize)],
) -> Result<(), TensorError> {
    if block_mapping.is_empty() {
        return Ok(());
    }

    let src_indices: Vec<usize> = block_mapping.iter().map(|&(s, _)| s).collect();
    let dst_indices: Vec<usize> = block_mapping.iter().map(|&(_, d)| d).collect();

    let rows = src.index_select(&src_indices)?;
    dst.index_copy(&dst_indices, rows.view())?;

    debug!(
        blocks = block_mapping.len(),
        src = %src.device().placement(),
        dst = %dst.device().placement(),
        "relocated blocks"
    );

    dst.device().mark_step();
    dst.device().synchronize();
    Ok(())
}
