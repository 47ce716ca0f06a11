//! TNV Core Algorithm Library
//!
//! Multi-threaded Total Nuclear Variation (TNV) denoising of multi-channel 2D
//! images with an adaptive primal-dual hybrid gradient (PDHG) solver. The
//! image rows are split into bands, one per worker of a fixed rayon pool;
//! bands exchange a single halo row after every iteration.

pub mod config;
pub mod controller;
pub mod error;
pub mod float_trait;
mod halo;
mod kernel;
pub mod layout;
pub mod operators;
pub mod orchestration;
pub mod partition;
pub mod prox;
pub mod solver;
mod worker;

// Re-export commonly used types at the crate root
pub use config::{StepSizeConfig, TnvConfig};
pub use controller::{IterationStats, StepDecision};
pub use error::{TnvError, TnvResult};
pub use float_trait::TnvFloat;
pub use operators::{divergence, gradient, tnv_energy, tnv_objective};
pub use orchestration::{solve, tnv_denoise, tnv_denoise_channel_major};
pub use prox::SingularValueNorm;
pub use solver::{TnvReport, TnvSolver};
