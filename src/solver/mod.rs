mod base;
mod common;
mod matrix;
mod polynomial;
mod sac;

pub use base::{ErrorMetric, MinimalSampleKernel, Solver};
pub use common::{compact, convert_points_homogeneous, normalize, to_homogeneous, Normalization};
pub use matrix::*;
pub use polynomial::solve_cubic;
pub use sac::{update_num_iters, RobustSampler, SacEngine, SacOutcome, SacParams};
