//! Device placement and synchronization boundaries.
//!
//! Every tensor carries a device handle recording where its storage
//! logically resides. The accelerator executes queued work asynchronously
//! relative to the calling thread, so an op that mutates a cache destined
//! for immediate reuse must force an execution boundary before returning:
//! [`Device::mark_step`] closes the pending op graph into one submitted
//! step, [`Device::synchronize`] blocks until submitted work has completed.
//! The handle also counts the indexed operations issued against it, which
//! keeps pass counts and sync boundaries observable.
//!
//! Without the `cuda` feature, accelerator placements are host-backed
//! stand-ins with identical bookkeeping, for CPU-only testing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a tensor's storage logically resides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// Host RAM.
    Host,
    /// Accelerator VRAM, by device ordinal.
    Cuda { ordinal: usize },
}

impl Placement {
    /// Whether this placement is an accelerator device.
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Placement::Cuda { .. })
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Host => write!(f, "host"),
            Placement::Cuda { ordinal } => write!(f, "cuda:{ordinal}"),
        }
    }
}

#[derive(Debug, Default)]
struct OpCounters {
    scatter_ops: AtomicU64,
    gather_ops: AtomicU64,
    copy_ops: AtomicU64,
    mark_steps: AtomicU64,
    synchronizes: AtomicU64,
}

/// Point-in-time snapshot of a device's operation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    /// Scatter (`index_put`) passes issued.
    pub scatter_ops: u64,
    /// Whole-block gathers issued.
    pub gather_ops: u64,
    /// Whole-block copies issued.
    pub copy_ops: u64,
    /// Execution boundaries marked.
    pub mark_steps: u64,
    /// Blocking synchronizations issued.
    pub synchronizes: u64,
}

/// A device handle, shared via [`Arc`] by every tensor placed on it.
#[derive(Debug)]
pub struct Device {
    placement: Placement,
    counters: OpCounters,
}

impl Device {
    /// A host-memory device.
    pub fn host() -> Arc<Self> {
        Arc::new(Self {
            placement: Placement::Host,
            counters: OpCounters::default(),
        })
    }

    /// An accelerator device by ordinal.
    pub fn cuda(ordinal: usize) -> Arc<Self> {
        Arc::new(Self {
            placement: Placement::Cuda { ordinal },
            counters: OpCounters::default(),
        })
    }

    /// This device's placement.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Whether this is an accelerator device.
    pub fn is_accelerator(&self) -> bool {
        self.placement.is_accelerator()
    }

    /// Mark an execution boundary: ops queued up to this point form one
    /// submitted step.
    pub fn mark_step(&self) {
        self.counters.mark_steps.fetch_add(1, Ordering::Relaxed);
        debug!(device = %self.placement, "mark_step");
    }

    /// Block until all submitted work on this device has completed.
    pub fn synchronize(&self) {
        self.counters.synchronizes.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "cuda")]
        if let Placement::Cuda { ordinal } = self.placement {
            cuda_synchronize(ordinal);
        }

        debug!(device = %self.placement, "synchronize");
    }

    /// Snapshot the operation counters.
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            scatter_ops: self.counters.scatter_ops.load(Ordering::Relaxed),
            gather_ops: self.counters.gather_ops.load(Ordering::Relaxed),
            copy_ops: self.counters.copy_ops.load(Ordering::Relaxed),
            mark_steps: self.counters.mark_steps.load(Ordering::Relaxed),
            synchronizes: self.counters.synchronizes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_scatter(&self) {
        self.counters.scatter_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gather(&self) {
        self.counters.gather_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_copy(&self) {
        self.counters.copy_ops.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(feature = "cuda")]
fn cuda_synchronize(_ordinal: usize) {
    // Real implementation would bind the cudarc stream for this ordinal
    // and block on it. Gated so default builds stay host-only.
    todo!("CUDA stream synchronization with cudarc")
}
