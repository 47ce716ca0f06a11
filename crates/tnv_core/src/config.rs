//! Solver configuration.
//!
//! [`TnvConfig`] carries the user-facing parameters of a solve together with
//! the constants of the adaptive step-size controller. All values default to
//! those of the reference solver.

use crate::error::{TnvError, TnvResult};
use crate::float_trait::TnvFloat;
use crate::prox::SingularValueNorm;

// =============================================================================
// Constants
// =============================================================================

/// Default fidelity parameter (smaller means stronger denoising)
pub const DEFAULT_LAMBDA: f64 = 0.05;

/// Default iteration cap
pub const DEFAULT_MAX_ITER: usize = 500;

/// Default tolerance on the normalized residual
pub const DEFAULT_TOL: f64 = 1e-5;

/// Default channel padding alignment (1 = no padding)
pub const DEFAULT_CHANNEL_ALIGNMENT: usize = 1;

/// Initial primal step size
pub const DEFAULT_TAU: f64 = 0.5;

/// Initial dual step size
pub const DEFAULT_SIGMA: f64 = 0.5;

/// Over-relaxation of the gradient extrapolation
pub const DEFAULT_THETA: f64 = 1.0;

/// Target ratio between primal and dual residuals
pub const DEFAULT_BALANCE: f64 = 1.0;

/// Safety margin of the step acceptance test
pub const DEFAULT_GAMMA: f64 = 0.75;

/// Step shrink factor applied on rejection
pub const DEFAULT_BETA: f64 = 0.95;

/// Initial adaptivity of the primal/dual rebalancing
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Residual imbalance that triggers rebalancing
pub const DEFAULT_DELTA: f64 = 1.5;

/// Decay of the adaptivity after each rebalancing
pub const DEFAULT_ETA: f64 = 0.95;

/// Environment variable overriding the worker count
pub const NUM_THREADS_ENV: &str = "TNV_NUM_THREADS";

// =============================================================================
// Types
// =============================================================================

/// Constants of the adaptive primal-dual step-size controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSizeConfig<F: TnvFloat> {
    /// Initial primal step size. Default: 0.5
    pub tau: F,
    /// Initial dual step size. Default: 0.5
    pub sigma: F,
    /// Extrapolation factor. Default: 1.0
    pub theta: F,
    /// Primal/dual balance target `s`. Default: 1.0
    pub balance: F,
    /// Acceptance margin `gamma`. Default: 0.75
    pub gamma: F,
    /// Rejection shrink `beta`. Default: 0.95
    pub beta: F,
    /// Initial adaptivity `alpha0`. Default: 0.2
    pub alpha: F,
    /// Imbalance threshold `delta`. Default: 1.5
    pub delta: F,
    /// Adaptivity decay `eta`. Default: 0.95
    pub eta: F,
}

impl<F: TnvFloat> Default for StepSizeConfig<F> {
    fn default() -> Self {
        Self {
            tau: F::from_f64_c(DEFAULT_TAU),
            sigma: F::from_f64_c(DEFAULT_SIGMA),
            theta: F::from_f64_c(DEFAULT_THETA),
            balance: F::from_f64_c(DEFAULT_BALANCE),
            gamma: F::from_f64_c(DEFAULT_GAMMA),
            beta: F::from_f64_c(DEFAULT_BETA),
            alpha: F::from_f64_c(DEFAULT_ALPHA),
            delta: F::from_f64_c(DEFAULT_DELTA),
            eta: F::from_f64_c(DEFAULT_ETA),
        }
    }
}

impl<F: TnvFloat> StepSizeConfig<F> {
    /// Validate the controller constants.
    pub fn validate(&self) -> TnvResult<()> {
        let zero = F::zero();
        let one = F::one();
        let positive = [
            ("tau", self.tau),
            ("sigma", self.sigma),
            ("balance", self.balance),
            ("gamma", self.gamma),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > zero) {
                return Err(invalid(format!("{name} must be finite and > 0")));
            }
        }
        if !(self.theta >= zero && self.theta <= one) {
            return Err(invalid("theta must be in [0, 1]"));
        }
        let unit_open = [("beta", self.beta), ("alpha", self.alpha), ("eta", self.eta)];
        for (name, value) in unit_open {
            if !(value > zero && value < one) {
                return Err(invalid(format!("{name} must be in (0, 1)")));
            }
        }
        if !(self.delta.is_finite() && self.delta > one) {
            return Err(invalid("delta must be finite and > 1"));
        }
        Ok(())
    }
}

/// Configuration of a TNV solve.
///
/// Use `Default::default()` for the reference settings.
#[derive(Debug, Clone)]
pub struct TnvConfig<F: TnvFloat> {
    /// Fidelity parameter; the solver weights the data term by
    /// `1 / (2 * lambda)`. Default: 0.05
    pub lambda: F,
    /// Iteration cap. Default: 500
    pub max_iter: usize,
    /// Stop once the normalized residual drops below this. Default: 1e-5
    pub tol: F,
    /// Singular-value norm of the regulariser. Default: L1 (nuclear)
    pub norm: SingularValueNorm,
    /// Requested worker count. `None` reads `TNV_NUM_THREADS`, then falls
    /// back to the rayon default.
    pub num_threads: Option<usize>,
    /// Channel count is rounded up to a multiple of this. Default: 1
    pub channel_alignment: usize,
    /// Adaptive step-size controller constants.
    pub step: StepSizeConfig<F>,
}

impl<F: TnvFloat> Default for TnvConfig<F> {
    fn default() -> Self {
        Self {
            lambda: F::from_f64_c(DEFAULT_LAMBDA),
            max_iter: DEFAULT_MAX_ITER,
            tol: F::from_f64_c(DEFAULT_TOL),
            norm: SingularValueNorm::default(),
            num_threads: None,
            channel_alignment: DEFAULT_CHANNEL_ALIGNMENT,
            step: StepSizeConfig::default(),
        }
    }
}

impl<F: TnvFloat> TnvConfig<F> {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters.
    pub fn validate(&self) -> TnvResult<()> {
        if !(self.lambda.is_finite() && self.lambda > F::zero()) {
            return Err(invalid("lambda must be finite and > 0"));
        }
        if self.max_iter == 0 {
            return Err(invalid("max_iter must be > 0"));
        }
        if !(self.tol >= F::zero()) {
            return Err(invalid("tol must be >= 0"));
        }
        if self.num_threads == Some(0) {
            return Err(invalid("num_threads must be > 0"));
        }
        if self.channel_alignment == 0 {
            return Err(invalid("channel_alignment must be > 0"));
        }
        self.step.validate()
    }

    /// Worker count requested before the per-shape cap is applied.
    pub fn resolved_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(resolve_num_threads)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn invalid(msg: impl Into<String>) -> TnvError {
    TnvError::InvalidInput(msg.into())
}

/// Resolve the worker count from the environment, falling back to the size
/// of the global rayon pool.
fn resolve_num_threads() -> usize {
    parse_num_threads(std::env::var(NUM_THREADS_ENV).ok().as_deref())
        .unwrap_or_else(rayon::current_num_threads)
}

fn parse_num_threads(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config: TnvConfig<f32> = TnvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iter, 500);
        assert_eq!(config.norm, SingularValueNorm::L1);
        assert!((config.lambda - 0.05).abs() < 1e-7);
        assert!((config.step.gamma - 0.75).abs() < 1e-7);
    }

    #[test]
    fn test_invalid_lambda() {
        for lambda in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = TnvConfig::<f64> {
                lambda,
                ..TnvConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(TnvError::InvalidInput(_))),
                "lambda={}",
                lambda
            );
        }
    }

    #[test]
    fn test_invalid_iteration_and_tolerance() {
        let config = TnvConfig::<f64> {
            max_iter: 0,
            ..TnvConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TnvConfig::<f64> {
            tol: -1e-3,
            ..TnvConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TnvConfig::<f64> {
            tol: 0.0,
            ..TnvConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threads_and_alignment() {
        let config = TnvConfig::<f32> {
            num_threads: Some(0),
            ..TnvConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TnvConfig::<f32> {
            channel_alignment: 0,
            ..TnvConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_step_constants() {
        let mut step = StepSizeConfig::<f64>::default();
        step.beta = 1.0;
        assert!(step.validate().is_err());

        let mut step = StepSizeConfig::<f64>::default();
        step.delta = 1.0;
        assert!(step.validate().is_err());

        let mut step = StepSizeConfig::<f64>::default();
        step.tau = 0.0;
        let err = step.validate().unwrap_err();
        assert!(err.to_string().contains("tau"));

        let config = TnvConfig::<f64> {
            step,
            ..TnvConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_threads_win() {
        let config = TnvConfig::<f32> {
            num_threads: Some(3),
            ..TnvConfig::default()
        };
        assert_eq!(config.resolved_num_threads(), 3);
    }

    #[test]
    fn test_parse_num_threads() {
        assert_eq!(parse_num_threads(Some("4")), Some(4));
        assert_eq!(parse_num_threads(Some(" 8 ")), Some(8));
        assert_eq!(parse_num_threads(Some("0")), None);
        assert_eq!(parse_num_threads(Some("many")), None);
        assert_eq!(parse_num_threads(None), None);
    }
}
