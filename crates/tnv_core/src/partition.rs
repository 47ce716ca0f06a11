//! Row-band partitioning of the image across workers.
//!
//! The row axis is split into contiguous, near-equal bands. Every band except
//! the last carries one extra "copy row" (the first row of the next band),
//! read by the kernel for vertical differences but never written back.

/// Contiguous range of image rows owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// Position of the band in the partition.
    pub index: usize,
    /// First image row of the band.
    pub offset: usize,
    /// Rows owned by the band.
    pub rows: usize,
    /// Rows held in local buffers (`rows + 1` for all but the last band).
    pub copy_rows: usize,
}

impl Band {
    /// True when the band starts at the image's first row.
    #[inline]
    pub fn is_first(&self) -> bool {
        self.offset == 0
    }

    /// True when the band carries a ghost row below its own rows.
    #[inline]
    pub fn has_ghost(&self) -> bool {
        self.copy_rows > self.rows
    }
}

/// Cap a requested worker count so that every band gets at least 2 rows.
///
/// A degenerate request (0 workers, or fewer than 2 rows) collapses to a
/// single worker owning the whole image.
pub fn usable_workers(rows: usize, requested: usize) -> usize {
    requested.min(rows / 2).max(1)
}

/// Split `rows` image rows into `usable_workers(rows, requested)` bands.
pub fn plan_bands(rows: usize, requested: usize) -> Vec<Band> {
    let workers = usable_workers(rows, requested);
    let step = rows / workers;
    let extra = rows % workers;

    let mut bands = Vec::with_capacity(workers);
    let mut offset = 0usize;
    for index in 0..workers {
        let size = step + usize::from(index < extra);
        let copy_rows = if index + 1 == workers { size } else { size + 1 };
        bands.push(Band {
            index,
            offset,
            rows: size,
            copy_rows,
        });
        offset += size;
    }
    bands
}
