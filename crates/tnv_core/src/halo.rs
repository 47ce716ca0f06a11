//! Reconciliation of band boundaries after a parallel kernel pass.
//!
//! A band's first row is computed without the vertical dual value of the
//! row above it, which belongs to the previous band. Once every band has
//! finished, this pass subtracts that value from the first-row divergence,
//! copies the corrected row into the previous band's ghost row, and
//! evaluates the primal residual the kernel had to skip for that row.

use crate::float_trait::TnvFloat;
use crate::worker::{BandWorker, WorkerPhase};

/// Stitch all adjacent band pairs and return the deferred primal residual.
///
/// `tau` must be the primal step size the kernel pass ran with.
pub(crate) fn reconcile_bands<F: TnvFloat>(workers: &mut [BandWorker<F>], tau: F) -> F {
    let div_tau = F::one() / tau;
    let mut resprimal = F::zero();

    for j in 1..workers.len() {
        let (head, tail) = workers.split_at_mut(j);
        let prev = &mut head[j - 1];
        let cur = &mut tail[0];
        debug_assert_eq!(prev.phase, WorkerPhase::Stepped);
        debug_assert_eq!(cur.phase, WorkerPhase::Stepped);

        let layout = cur.layout;
        let last = layout.pixel(prev.band.rows - 1, 0);
        let ghost = layout.pixel(prev.band.rows, 0);

        for i in 0..layout.cols {
            for k in 0..layout.channels {
                let l = layout.at(0, i, k);
                cur.div[l] -= prev.qy[last + l];
                prev.div[ghost + l] = cur.div[l];

                let div_diff = cur.div0[l] - cur.div[l];
                resprimal += (div_tau * cur.udiff0[l] + div_diff).abs();
            }
        }
    }

    resprimal
}
