//! Block-organized cache tensor storage and its native indexed primitives.
//!
//! A cache tensor is a dense row-major array of shape
//! `[num_blocks, block_size, ...feature_dims]`, allocated once by the
//! engine and only ever mutated in place by the cache ops. The indexed
//! primitives mirror what the accelerator runtime provides natively:
//! - [`CacheTensor::index_put`]: per-slot scatter writes, capped at the
//!   tensor's total slot capacity per call
//! - [`CacheTensor::index_select`]: whole-block gather
//! - [`CacheTensor::index_copy`]: whole-block writes
//!
//! All three validate indices and shapes up front and error immediately;
//! a failed call leaves the tensor untouched. Callers above this layer
//! propagate these errors unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::Device;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("{what} index {index} out of range ({bound} available)")]
    AddressOutOfRange {
        what: &'static str,
        index: usize,
        bound: usize,
    },

    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("scatter of {requested} slots exceeds single-pass capacity {capacity}")]
    ScatterCapacityExceeded { requested: usize, capacity: usize },

    #[error("index count mismatch: {blocks} block indices vs {offsets} offsets")]
    IndexCountMismatch { blocks: usize, offsets: usize },
}

/// Element type tag for cache tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// IEEE half precision.
    F16,
    /// Brain floating point.
    Bf16,
    /// Single precision.
    F32,
}

impl DType {
    /// Bytes per element for this type.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F16 | DType::Bf16 => 2,
            DType::F32 => 4,
        }
    }
}

/// Element types a cache tensor can hold.
pub trait Element:
    bytemuck::Pod + Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    const DTYPE: DType;
}

impl Element for half::f16 {
    const DTYPE: DType = DType::F16;
}

impl Element for half::bf16 {
    const DTYPE: DType = DType::Bf16;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

/// A borrowed window of whole dim-0 rows, produced by
/// [`CacheTensor::view`] and [`CacheTensor::narrow`].
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T: Element> {
    data: &'a [T],
    rows: usize,
    trailing: &'a [usize],
}

impl<'a, T: Element> TensorView<'a, T> {
    /// Number of rows in the window.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimensions of one row.
    pub fn trailing_dims(&self) -> &'a [usize] {
        self.trailing
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        self.trailing.iter().product()
    }

    /// Flat element slice backing the window.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }
}

/// A dense row-major tensor tagged with the device its contents logically
/// live on.
///
/// Cache tensors use the `[num_blocks, block_size, ...feature_dims]`
/// layout; token inputs use `[num_tokens, ...feature_dims]`.
#[derive(Debug, Clone)]
pub struct CacheTensor<T: Element> {
    shape: Vec<usize>,
    data: Vec<T>,
    device: Arc<Device>,
}

impl<T: Element> CacheTensor<T> {
    /// Allocate a zero-filled tensor.
    pub fn zeros(shape: &[usize], device: Arc<Device>) -> Self {
        let n = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![T::default(); n],
            device,
        }
    }

    /// Build a tensor from row-major data.
    pub fn from_vec(
        data: Vec<T>,
        shape: &[usize],
        device: Arc<Device>,
    ) -> Result<Self, TensorError> {
        let n: usize = shape.iter().product();
        if n != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
            device,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn elem_count(&self) -> usize {
        self.data.len()
    }

    /// Number of blocks (dim 0) of a cache-shaped tensor.
    pub fn num_blocks(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Tokens per block (dim 1) of a cache-shaped tensor.
    pub fn block_size(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }

    /// Total addressable slots, `num_blocks * block_size`. Fixed for the
    /// lifetime of the tensor; also the per-call ceiling of
    /// [`CacheTensor::index_put`].
    pub fn num_slots(&self) -> usize {
        self.num_blocks() * self.block_size()
    }

    /// Elements in one feature vector (dims after block and offset).
    pub fn feature_len(&self) -> usize {
        self.shape.get(2..).map(|d| d.iter().product()).unwrap_or(1)
    }

    /// Elements in one dim-0 row.
    pub fn row_len(&self) -> usize {
        self.shape.get(1..).map(|d| d.iter().product()).unwrap_or(1)
    }

    /// Flat element slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Raw bytes of the storage, for byte-level comparisons.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Copy of the flat storage.
    pub fn to_vec(&self) -> Vec<T> {
        self.data.clone()
    }

    /// The feature vector stored at `(block, offset)`, if in range.
    pub fn slot(&self, block: usize, offset: usize) -> Option<&[T]> {
        if block >= self.num_blocks() || offset >= self.block_size() {
            return None;
        }
        let feature = self.feature_len();
        let at = (block * self.block_size() + offset) * feature;
        Some(&self.data[at..at + feature])
    }

    /// All slots of one block, if in range.
    pub fn block(&self, index: usize) -> Option<&[T]> {
        if index >= self.num_blocks() {
            return None;
        }
        let row = self.row_len();
        Some(&self.data[index * row..(index + 1) * row])
    }

    /// Borrow the whole tensor as a row window.
    pub fn view(&self) -> TensorView<'_, T> {
        TensorView {
            data: &self.data,
            rows: self.shape.first().copied().unwrap_or(0),
            trailing: self.shape.get(1..).unwrap_or(&[]),
        }
    }

    /// Borrow `len` dim-0 rows starting at `start`.
    pub fn narrow(&self, start: usize, len: usize) -> Result<TensorView<'_, T>, TensorError> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if start + len > rows {
            return Err(TensorError::AddressOutOfRange {
                what: "row",
                index: start + len,
                bound: rows,
            });
        }
        let row = self.row_len();
        Ok(TensorView {
            data: &self.data[start * row..(start + len) * row],
            rows: len,
            trailing: self.shape.get(1..).unwrap_or(&[]),
        })
    }

    /// Scatter `src` rows into the `(block, offset)` slots named by the
    /// aligned index vectors.
    ///
    /// The native scatter cannot address more slots in one call than the
    /// tensor holds in total; larger writes must be split into passes (see
    /// [`crate::ops::write`]). Duplicate addresses within a call resolve
    /// to the last occurrence in index order.
    pub fn index_put(
        &mut self,
        block_indices: &[usize],
        block_offsets: &[usize],
        src: TensorView<'_, T>,
    ) -> Result<(), TensorError> {
        if block_indices.len() != block_offsets.len() {
            return Err(TensorError::IndexCountMismatch {
                blocks: block_indices.len(),
                offsets: block_offsets.len(),
            });
        }
        let n = block_indices.len();
        let capacity = self.num_slots();
        if n > capacity {
            return Err(TensorError::ScatterCapacityExceeded {
                requested: n,
                capacity,
            });
        }

        let feature_dims = self.shape.get(2..).unwrap_or(&[]);
        if src.rows() != n || src.trailing_dims() != feature_dims {
            let mut expected = vec![n];
            expected.extend_from_slice(feature_dims);
            let mut got = vec![src.rows()];
            got.extend_from_slice(src.trailing_dims());
            return Err(TensorError::ShapeMismatch { expected, got });
        }

        let num_blocks = self.num_blocks();
        let block_size = self.block_size();
        for (&b, &o) in block_indices.iter().zip(block_offsets) {
            if b >= num_blocks {
                return Err(TensorError::AddressOutOfRange {
                    what: "block",
                    index: b,
                    bound: num_blocks,
                });
            }
            if o >= block_size {
                return Err(TensorError::AddressOutOfRange {
                    what: "offset",
                    index: o,
                    bound: block_size,
                });
            }
        }

        let feature = self.feature_len();
        let src_data = src.as_slice();
        for (i, (&b, &o)) in block_indices.iter().zip(block_offsets).enumerate() {
            let dst = (b * block_size + o) * feature;
            self.data[dst..dst + feature]
                .copy_from_slice(&src_data[i * feature..(i + 1) * feature]);
        }

        self.device.record_scatter();
        Ok(())
    }

    /// Gather whole blocks, in index order, into a new tensor of shape
    /// `[indices.len(), block_size, ...feature_dims]`.
    pub fn index_select(&self, block_indices: &[usize]) -> Result<CacheTensor<T>, TensorError> {
        let num_blocks = self.num_blocks();
        for &b in block_indices {
            if b >= num_blocks {
                return Err(TensorError::AddressOutOfRange {
                    what: "block",
                    index: b,
                    bound: num_blocks,
                });
            }
        }

        let row = self.row_len();
        let mut data = Vec::with_capacity(block_indices.len() * row);
        for &b in block_indices {
            data.extend_from_slice(&self.data[b * row..(b + 1) * row]);
        }

        let mut shape = vec![block_indices.len()];
        shape.extend_from_slice(self.shape.get(1..).unwrap_or(&[]));

        self.device.record_gather();
        Ok(CacheTensor {
            shape,
            data,
            device: self.device.clone(),
        })
    }

    /// Write whole block rows at the dim-0 indices from a gathered source.
    pub fn index_copy(
        &mut self,
        block_indices: &[usize],
        src: TensorView<'_, T>,
    ) -> Result<(), TensorError> {
        let row_dims = self.shape.get(1..).unwrap_or(&[]);
        if src.rows() != block_indices.len() || src.trailing_dims() != row_dims {
            let mut expected = vec![block_indices.len()];
            expected.extend_from_slice(row_dims);
            let mut got = vec![src.rows()];
            got.extend_from_slice(src.trailing_dims());
            return Err(TensorError::ShapeMismatch { expected, got });
        }

        let num_blocks = self.num_blocks();
        for &b in block_indices {
            if b >= num_blocks {
                return Err(TensorError::AddressOutOfRange {
                    what: "block",
                    index: b,
                    bound: num_blocks,
                });
            }
        }

        let row = self.row_len();
        let src_data = src.as_slice();
        for (i, &b) in block_indices.iter().enumerate() {
            self.data[b * row..(b + 1) * row].copy_from_slice(&src_data[i * row..(i + 1) * row]);
        }

        self.device.record_copy();
        Ok(())
    }
}
