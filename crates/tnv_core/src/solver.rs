//! Reusable multi-threaded TNV solver.
//!
//! [`TnvSolver`] owns a context made of a fixed rayon pool and one
//! [`BandWorker`] per row band. The context is built on the first solve and
//! kept for later solves of the same shape; a different shape drops it and
//! builds a new one. Every iteration is a fork-join round over the workers,
//! followed by the single-threaded halo pass and the step-size update.

use std::panic::{catch_unwind, AssertUnwindSafe};

use ndarray::{ArrayView3, ArrayViewMut3};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use crate::config::TnvConfig;
use crate::controller::{IterationStats, StepController, StepDecision};
use crate::error::{TnvError, TnvResult};
use crate::float_trait::TnvFloat;
use crate::halo::reconcile_bands;
use crate::layout::BandLayout;
use crate::partition::{plan_bands, Band};
use crate::worker::{allocate_workers, split_rows, BandWorker, Residuals};

/// Summary of a finished solve.
#[derive(Debug, Clone)]
pub struct TnvReport<F: TnvFloat> {
    /// Normalized residual of the last iteration.
    pub residual: F,
    /// Iterations run, restarts included.
    pub iterations: usize,
    /// True when the residual dropped below the tolerance.
    pub converged: bool,
    /// Number of row bands the image was split into.
    pub workers: usize,
    /// Rejected steps that could no longer be rolled back.
    pub unrecoverable_rejections: usize,
    pub history: Vec<IterationStats<F>>,
}

/// Shape-keyed pool and worker buffers.
struct SolverContext<F: TnvFloat> {
    shape: (usize, usize, usize),
    alignment: usize,
    requested: usize,
    pool: ThreadPool,
    workers: Vec<BandWorker<F>>,
}

impl<F: TnvFloat> SolverContext<F> {
    fn build(shape: (usize, usize, usize), alignment: usize, requested: usize) -> TnvResult<Self> {
        let (rows, cols, channels) = shape;
        let bands = plan_bands(rows, requested);
        let layout = BandLayout::new(cols, channels, alignment);

        let pool = ThreadPoolBuilder::new()
            .num_threads(bands.len())
            .thread_name(|i| format!("tnv-worker-{i}"))
            .build()?;
        let workers = allocate_workers(&bands, layout)?;

        debug!(
            rows,
            cols,
            channels,
            workers = workers.len(),
            bytes = workers.iter().map(|w| w.footprint_bytes()).sum::<usize>(),
            "allocated solver context"
        );

        Ok(Self {
            shape,
            alignment,
            requested,
            pool,
            workers,
        })
    }

    fn matches(&self, shape: (usize, usize, usize), alignment: usize, requested: usize) -> bool {
        self.shape == shape && self.alignment == alignment && self.requested == requested
    }
}

/// Multi-threaded TNV denoiser with a reusable context.
pub struct TnvSolver<F: TnvFloat> {
    config: TnvConfig<F>,
    context: Option<SolverContext<F>>,
}

impl<F: TnvFloat> TnvSolver<F> {
    /// Create a solver. No buffers or threads are reserved until the first
    /// solve.
    pub fn new(config: TnvConfig<F>) -> TnvResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            context: None,
        })
    }

    pub fn config(&self) -> &TnvConfig<F> {
        &self.config
    }

    /// True when a context is held for reuse.
    pub fn is_allocated(&self) -> bool {
        self.context.is_some()
    }

    /// Worker count of the held context, 0 when none is held.
    pub fn workers(&self) -> usize {
        self.context.as_ref().map_or(0, |ctx| ctx.workers.len())
    }

    /// Release the pool and all worker buffers.
    pub fn shutdown(&mut self) {
        if self.context.take().is_some() {
            debug!("released solver context");
        }
    }

    /// Denoise `input` into `solution`, which also holds the initial guess.
    ///
    /// Both volumes are `(rows, cols, channels)` and may have any strides.
    /// A failed solve releases the context; `solution` is only written once
    /// the iteration has finished.
    pub fn solve(
        &mut self,
        input: ArrayView3<F>,
        solution: ArrayViewMut3<F>,
    ) -> TnvResult<TnvReport<F>> {
        validate_shapes(input.dim(), solution.dim())?;
        let result = self.run(input, solution);
        if result.is_err() {
            self.context = None;
        }
        result
    }

    fn ensure_context(&mut self, shape: (usize, usize, usize)) -> TnvResult<&mut SolverContext<F>> {
        let alignment = self.config.channel_alignment;
        let requested = self.config.resolved_num_threads();
        let reusable = self
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.matches(shape, alignment, requested));

        if !reusable {
            self.context = None;
            self.context = Some(SolverContext::build(shape, alignment, requested)?);
        }
        match self.context.as_mut() {
            Some(ctx) => Ok(ctx),
            None => Err(TnvError::Scheduler("solver context unavailable".to_string())),
        }
    }

    fn run(
        &mut self,
        input: ArrayView3<F>,
        mut solution: ArrayViewMut3<F>,
    ) -> TnvResult<TnvReport<F>> {
        let shape = input.dim();
        let config = self.config.clone();
        let SolverContext { pool, workers, .. } = self.ensure_context(shape)?;

        let (rows, cols, channels) = shape;
        let cells = F::usize_as(rows * cols * channels);
        let lambda = F::one() / (F::from_f64_c(2.0) * config.lambda);
        let norm = config.norm;

        let initial = solution.view();
        dispatch(pool, || {
            workers
                .par_iter_mut()
                .for_each(|w| w.load(input, initial))
        })?;

        let mut controller = StepController::new(config.step);
        let mut history = Vec::with_capacity(config.max_iter.min(4096));
        let mut residual = F::LARGE;
        let mut converged = false;
        let mut rejections = 0usize;

        for iteration in 0..config.max_iter {
            let params = controller.params(lambda, norm);
            dispatch(pool, || workers.par_iter_mut().for_each(|w| w.step(&params)))?;

            let boundary = reconcile_bands(workers, params.tau);
            let mut totals = workers
                .iter()
                .fold(Residuals::zero(), |acc, w| acc.merge(w.partial));
            totals.resprimal += boundary;
            residual = (totals.resprimal + totals.resdual) / cells;

            let (decision, balance) = controller.update(&totals);
            history.push(IterationStats {
                iteration,
                residual,
                resprimal: totals.resprimal,
                resdual: totals.resdual,
                balance,
                tau: params.tau,
                sigma: params.sigma,
                decision,
            });
            debug!(
                iteration,
                residual = %residual,
                b = %balance,
                tau = %controller.tau(),
                sigma = %controller.sigma(),
                decision = ?decision,
                "tnv iteration"
            );

            match decision {
                StepDecision::Restart => {
                    dispatch(pool, || workers.par_iter_mut().for_each(|w| w.restore()))?;
                    continue;
                }
                StepDecision::UnrecoverableRejection => {
                    rejections += 1;
                    warn!(
                        iteration,
                        b = %balance,
                        "step rejected after warm-up; continuing with reduced steps"
                    );
                }
                _ => {}
            }

            if residual < config.tol {
                converged = true;
                break;
            }
        }

        let bands: Vec<Band> = workers.iter().map(|w| w.band).collect();
        let parts = split_rows(solution.view_mut(), bands);
        dispatch(pool, || {
            workers
                .par_iter_mut()
                .zip(parts.into_par_iter())
                .for_each(|(w, out)| w.finalize(out))
        })?;

        let iterations = history.len();
        info!(
            iterations,
            residual = %residual,
            converged,
            workers = workers.len(),
            "tnv solve finished"
        );

        Ok(TnvReport {
            residual,
            iterations,
            converged,
            workers: workers.len(),
            unrecoverable_rejections: rejections,
            history,
        })
    }
}

/// Reject mismatched or empty volumes.
pub(crate) fn validate_shapes(
    input: (usize, usize, usize),
    solution: (usize, usize, usize),
) -> TnvResult<()> {
    if input != solution {
        return Err(TnvError::InvalidInput(format!(
            "input shape {:?} does not match solution shape {:?}",
            input, solution
        )));
    }
    let (rows, cols, channels) = input;
    if rows == 0 || cols == 0 || channels == 0 {
        return Err(TnvError::InvalidInput(format!(
            "volume must be non-empty, got shape {:?}",
            input
        )));
    }
    Ok(())
}

/// Run `op` inside `pool`, turning a worker panic into a scheduler error.
fn dispatch<R, OP>(pool: &ThreadPool, op: OP) -> TnvResult<R>
where
    R: Send,
    OP: FnOnce() -> R + Send,
{
    catch_unwind(AssertUnwindSafe(|| pool.install(op))).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TnvError::Scheduler(format!("worker panicked: {msg}"))
    })
}
