//! Padded band layout and buffer allocation.
//!
//! Worker buffers are flat `Vec`s holding rows of `cols` pixels, each pixel a
//! run of `pad` channel lanes (channel innermost). Only the first `channels`
//! lanes carry data; the padding lanes stay zero for the whole solve.

use crate::error::{TnvError, TnvResult};
use crate::float_trait::TnvFloat;

/// Stride description shared by every buffer of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLayout {
    pub cols: usize,
    pub channels: usize,
    pub pad: usize,
}

impl BandLayout {
    /// Build a layout whose channel stride is `channels` rounded up to a
    /// multiple of `alignment` (an alignment of 0 or 1 disables padding).
    pub fn new(cols: usize, channels: usize, alignment: usize) -> Self {
        let alignment = alignment.max(1);
        Self {
            cols,
            channels,
            pad: channels.div_ceil(alignment) * alignment,
        }
    }

    /// Number of lanes in one row.
    #[inline]
    pub fn row_len(&self) -> usize {
        self.cols * self.pad
    }

    /// Number of lanes in `rows` rows.
    #[inline]
    pub fn len(&self, rows: usize) -> usize {
        rows * self.row_len()
    }

    /// Linear index of `(row, col, ch)`.
    #[inline]
    pub fn at(&self, row: usize, col: usize, ch: usize) -> usize {
        debug_assert!(col < self.cols && ch < self.pad);
        (row * self.cols + col) * self.pad + ch
    }

    /// Linear index of the first lane of pixel `(row, col)`.
    #[inline]
    pub fn pixel(&self, row: usize, col: usize) -> usize {
        (row * self.cols + col) * self.pad
    }
}

/// Allocate a zero-filled buffer, reporting exhaustion instead of aborting.
pub fn zeroed_buffer<F: TnvFloat>(len: usize) -> TnvResult<Vec<F>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| TnvError::Allocation {
            bytes: len.saturating_mul(std::mem::size_of::<F>()),
        })?;
    buf.resize(len, F::zero());
    Ok(buf)
}
