//! Adaptive step-size control of the primal-dual iteration.
//!
//! After every kernel round the controller checks the backtracking condition
//! `b <= 1` and rebalances `tau` and `sigma` so that the primal and dual
//! residuals stay within a factor `delta` of each other.
//!
//! A rejected step (`b > 1`) before the first accepted one restarts the
//! iteration from zero with smaller steps. Once a step has been accepted the
//! state is never rolled back: further rejections only shrink the steps.

use crate::config::StepSizeConfig;
use crate::float_trait::TnvFloat;
use crate::kernel::StepParams;
use crate::prox::SingularValueNorm;
use crate::worker::Residuals;

/// Outcome of the step-size test for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Step accepted, residuals balanced.
    Accepted,
    /// Step accepted, primal residual dominated: `tau` grew, `sigma` shrank.
    GrowPrimal,
    /// Step accepted, dual residual dominated: `sigma` grew, `tau` shrank.
    GrowDual,
    /// Step rejected before any acceptance; the state was reset.
    Restart,
    /// Step rejected after warm-up; steps shrank but the iterate was kept.
    UnrecoverableRejection,
}

impl StepDecision {
    pub fn is_rejection(self) -> bool {
        matches!(self, Self::Restart | Self::UnrecoverableRejection)
    }
}

/// Diagnostics of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats<F: TnvFloat> {
    pub iteration: usize,
    /// `(resprimal + resdual)` normalized by the number of volume entries.
    pub residual: F,
    pub resprimal: F,
    pub resdual: F,
    /// Backtracking ratio `b`.
    pub balance: F,
    /// Step sizes the iteration ran with.
    pub tau: F,
    pub sigma: F,
    pub decision: StepDecision,
}

pub(crate) struct StepController<F: TnvFloat> {
    cfg: StepSizeConfig<F>,
    tau: F,
    sigma: F,
    alpha: F,
    started: bool,
}

impl<F: TnvFloat> StepController<F> {
    pub fn new(cfg: StepSizeConfig<F>) -> Self {
        Self {
            tau: cfg.tau,
            sigma: cfg.sigma,
            alpha: cfg.alpha,
            started: false,
            cfg,
        }
    }

    pub fn tau(&self) -> F {
        self.tau
    }

    pub fn sigma(&self) -> F {
        self.sigma
    }

    /// Parameters for the next kernel round. `lambda` is the internal
    /// fidelity weight.
    pub fn params(&self, lambda: F, norm: SingularValueNorm) -> StepParams<F> {
        StepParams {
            tau: self.tau,
            sigma: self.sigma,
            theta: self.cfg.theta,
            lambda,
            norm,
        }
    }

    /// Backtracking ratio for the merged residuals of a round run with the
    /// current step sizes. Zero when the denominator vanishes.
    pub fn balance(&self, r: &Residuals<F>) -> F {
        let two = F::from_f64_c(2.0);
        let denom = self.cfg.gamma * (self.sigma * r.unorm + self.tau * r.qnorm);
        if denom > F::zero() {
            two * self.tau * self.sigma * r.product / denom
        } else {
            F::zero()
        }
    }

    /// Apply the step-size rules and return the decision with its `b`.
    pub fn update(&mut self, r: &Residuals<F>) -> (StepDecision, F) {
        let one = F::one();
        let b = self.balance(r);

        if b > one {
            let shrink = self.cfg.beta / b;
            self.tau *= shrink;
            self.sigma *= shrink;
            self.alpha = self.cfg.alpha;
            let decision = if self.started {
                StepDecision::UnrecoverableRejection
            } else {
                StepDecision::Restart
            };
            return (decision, b);
        }

        self.started = true;
        let s = self.cfg.balance;
        let delta = self.cfg.delta;
        let keep = one - self.alpha;

        let decision = if r.resprimal > r.resdual * s * delta {
            self.tau /= keep;
            self.sigma *= keep;
            self.alpha *= self.cfg.eta;
            StepDecision::GrowPrimal
        } else if r.resprimal < r.resdual * s / delta {
            self.tau *= keep;
            self.sigma /= keep;
            self.alpha *= self.cfg.eta;
            StepDecision::GrowDual
        } else {
            StepDecision::Accepted
        };
        (decision, b)
    }
}
