//! Per-band worker state and its lifecycle.
//!
//! Each worker owns the padded buffers of one [`Band`]:
//!
//! | buffer                    | rows          |
//! |---------------------------|---------------|
//! | `input`, `u`, `div`       | `copy_rows`   |
//! | `qx`, `qy`, `gradx`, `grady` | `rows`     |
//! | `div0`, `udiff0`, `udiff` | 1 (top row)   |
//!
//! The lifecycle is Allocated → Loaded → Stepped (repeatable) → Restored
//! (optional) → Finalized. Buffers are kept after finalization so that the
//! next solve on the same shape skips allocation.

use ndarray::{s, ArrayView3, ArrayViewMut3};

use crate::error::TnvResult;
use crate::float_trait::TnvFloat;
use crate::layout::{zeroed_buffer, BandLayout};
use crate::partition::Band;

/// Lifecycle phase of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Allocated,
    Loaded,
    Stepped,
    Restored,
    Finalized,
}

/// Partial sums produced by one kernel pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Residuals<F: TnvFloat> {
    pub resprimal: F,
    pub resdual: F,
    pub product: F,
    pub unorm: F,
    pub qnorm: F,
}

impl<F: TnvFloat> Residuals<F> {
    pub fn zero() -> Self {
        Self {
            resprimal: F::zero(),
            resdual: F::zero(),
            product: F::zero(),
            unorm: F::zero(),
            qnorm: F::zero(),
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            resprimal: self.resprimal + other.resprimal,
            resdual: self.resdual + other.resdual,
            product: self.product + other.product,
            unorm: self.unorm + other.unorm,
            qnorm: self.qnorm + other.qnorm,
        }
    }
}

/// Per-channel temporaries of the kernel, allocated once per worker.
pub(crate) struct ChannelScratch<F: TnvFloat> {
    pub gradx_diff: Vec<F>,
    pub grady_diff: Vec<F>,
    pub ubar_x: Vec<F>,
    pub ubar_y: Vec<F>,
    pub udiff_next: Vec<F>,
}

impl<F: TnvFloat> ChannelScratch<F> {
    fn new(channels: usize) -> TnvResult<Self> {
        Ok(Self {
            gradx_diff: zeroed_buffer(channels)?,
            grady_diff: zeroed_buffer(channels)?,
            ubar_x: zeroed_buffer(channels)?,
            ubar_y: zeroed_buffer(channels)?,
            udiff_next: zeroed_buffer(channels)?,
        })
    }
}

pub(crate) struct BandWorker<F: TnvFloat> {
    pub band: Band,
    pub layout: BandLayout,
    pub input: Vec<F>,
    pub u: Vec<F>,
    pub qx: Vec<F>,
    pub qy: Vec<F>,
    pub gradx: Vec<F>,
    pub grady: Vec<F>,
    pub div: Vec<F>,
    pub div0: Vec<F>,
    pub udiff0: Vec<F>,
    pub udiff: Vec<F>,
    pub scratch: ChannelScratch<F>,
    pub partial: Residuals<F>,
    pub phase: WorkerPhase,
}

impl<F: TnvFloat> BandWorker<F> {
    /// Reserve every buffer of the band.
    pub fn allocate(band: Band, layout: BandLayout) -> TnvResult<Self> {
        let own = layout.len(band.rows);
        let copy = layout.len(band.copy_rows);
        let row = layout.row_len();

        Ok(Self {
            band,
            layout,
            input: zeroed_buffer(copy)?,
            u: zeroed_buffer(copy)?,
            qx: zeroed_buffer(own)?,
            qy: zeroed_buffer(own)?,
            gradx: zeroed_buffer(own)?,
            grady: zeroed_buffer(own)?,
            div: zeroed_buffer(copy)?,
            div0: zeroed_buffer(row)?,
            udiff0: zeroed_buffer(row)?,
            udiff: zeroed_buffer(row)?,
            scratch: ChannelScratch::new(layout.channels)?,
            partial: Residuals::zero(),
            phase: WorkerPhase::Allocated,
        })
    }

    /// Bytes held by the worker's buffers.
    pub fn footprint_bytes(&self) -> usize {
        let lanes = self.input.len()
            + self.u.len()
            + self.qx.len()
            + self.qy.len()
            + self.gradx.len()
            + self.grady.len()
            + self.div.len()
            + self.div0.len()
            + self.udiff0.len()
            + self.udiff.len();
        lanes * std::mem::size_of::<F>()
    }

    /// Copy rows `[offset, offset + copy_rows)` of the caller's volumes into
    /// the band and clear all derived state.
    pub fn load(&mut self, input: ArrayView3<F>, solution: ArrayView3<F>) {
        let band = self.band;
        let layout = self.layout;
        let (start, end) = (band.offset, band.offset + band.copy_rows);

        self.clear_derived();
        for ((j, i, k), &v) in input.slice(s![start..end, .., ..]).indexed_iter() {
            self.input[layout.at(j, i, k)] = v;
        }
        for ((j, i, k), &v) in solution.slice(s![start..end, .., ..]).indexed_iter() {
            self.u[layout.at(j, i, k)] = v;
        }
        self.partial = Residuals::zero();
        self.phase = WorkerPhase::Loaded;
    }

    /// Zero the primal, dual, gradient and divergence buffers without
    /// reloading the caller's volumes.
    pub fn restore(&mut self) {
        self.clear_derived();
        self.partial = Residuals::zero();
        self.phase = WorkerPhase::Restored;
    }

    /// Write the band's own rows of `u` into `out`, the matching row slice
    /// of the caller's solution.
    pub fn finalize(&mut self, mut out: ArrayViewMut3<F>) {
        debug_assert_eq!(out.dim().0, self.band.rows);
        let layout = self.layout;
        for ((j, i, k), v) in out.indexed_iter_mut() {
            *v = self.u[layout.at(j, i, k)];
        }
        self.phase = WorkerPhase::Finalized;
    }

    fn clear_derived(&mut self) {
        let zero = F::zero();
        self.u.fill(zero);
        self.qx.fill(zero);
        self.qy.fill(zero);
        self.gradx.fill(zero);
        self.grady.fill(zero);
        self.div.fill(zero);
    }
}

/// Allocate one worker per band.
pub(crate) fn allocate_workers<F: TnvFloat>(
    bands: &[Band],
    layout: BandLayout,
) -> TnvResult<Vec<BandWorker<F>>> {
    bands
        .iter()
        .map(|&band| BandWorker::allocate(band, layout))
        .collect()
}

/// Split a solution view into the disjoint own-row slices of each band.
pub(crate) fn split_rows<'a, F: TnvFloat>(
    solution: ArrayViewMut3<'a, F>,
    bands: impl IntoIterator<Item = Band>,
) -> Vec<ArrayViewMut3<'a, F>> {
    let mut rest = solution;
    let mut parts = Vec::new();
    for band in bands {
        let (head, tail) = rest.split_at(ndarray::Axis(0), band.rows);
        parts.push(head);
        rest = tail;
    }
    parts
}
