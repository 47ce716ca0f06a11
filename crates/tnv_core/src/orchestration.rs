//! One-shot entry points.
//!
//! These wrap a short-lived [`TnvSolver`] for callers that denoise a single
//! volume. Callers solving many volumes of the same shape should keep a
//! solver around instead, so the pool and buffers are reused.
//!
//! ## Layouts
//!
//! - **Pixel-major** `(rows, cols, channels)`: the native layout
//! - **Channel-major** `(channels, rows, cols)`: stacked single-channel images

use ndarray::{Array3, ArrayView3, ArrayViewMut3};

use crate::config::TnvConfig;
use crate::error::TnvResult;
use crate::float_trait::TnvFloat;
use crate::solver::{TnvReport, TnvSolver};

/// Denoise `input` into `solution` (which holds the initial guess) and
/// return the final normalized residual.
///
/// All other parameters take their defaults.
pub fn solve<F: TnvFloat>(
    input: ArrayView3<F>,
    solution: ArrayViewMut3<F>,
    lambda: F,
    max_iter: usize,
    tol: F,
) -> TnvResult<F> {
    let config = TnvConfig {
        lambda,
        max_iter,
        tol,
        ..TnvConfig::default()
    };
    let mut solver = TnvSolver::new(config)?;
    let report = solver.solve(input, solution)?;
    Ok(report.residual)
}

/// Denoise a pixel-major volume, starting from the input itself.
pub fn tnv_denoise<F: TnvFloat>(
    input: ArrayView3<F>,
    config: &TnvConfig<F>,
) -> TnvResult<(Array3<F>, TnvReport<F>)> {
    let mut solver = TnvSolver::new(config.clone())?;
    let mut solution = input.to_owned();
    let report = solver.solve(input, solution.view_mut())?;
    Ok((solution, report))
}

/// Denoise a channel-major `(channels, rows, cols)` volume.
///
/// The result has the same layout as the input.
pub fn tnv_denoise_channel_major<F: TnvFloat>(
    input: ArrayView3<F>,
    config: &TnvConfig<F>,
) -> TnvResult<(Array3<F>, TnvReport<F>)> {
    let mut solver = TnvSolver::new(config.clone())?;
    let mut solution = input.to_owned();
    let report = solver.solve(
        input.permuted_axes([1, 2, 0]),
        solution.view_mut().permuted_axes([1, 2, 0]),
    )?;
    Ok((solution, report))
}
