//! Fundamental matrix estimation between two views.
//!
//! Given matched points `p0 <-> p1`, the estimators find the rank-2 matrix `F`
//! with `p1ᵗ·F·p0 = 0`:
//!
//! - exactly seven correspondences: the 7-point algorithm (up to three candidates),
//! - [`Method::Linear8`]: the normalized 8-point algorithm on every point,
//! - [`Method::Ransac`] / [`Method::Lmeds`]: robust sampling of 7-point models,
//!   then an 8-point polish over the inliers.
//!
//! ```no_run
//! use epipolar::{find_fundamental, EstimateParams, Method, Point2};
//!
//! # let (points0, points1): (Vec<Point2>, Vec<Point2>) = (vec![], vec![]);
//! let params = EstimateParams {
//!     threshold: 1.0,
//!     ..EstimateParams::with_method(Method::Ransac)
//! };
//! let estimate = find_fundamental(&points0, &points1, &params)?;
//! println!("{} inliers\n{}", estimate.inlier_count(), estimate.matrix());
//! # Ok::<(), epipolar::FundamentalError>(())
//! ```

pub mod error;
pub mod num;
pub mod solver;
pub mod synthetic;

pub use error::FundamentalError;
pub use num::{Matrix3, Number, Point2, Tolerances, Vector3};
pub use solver::{
    estimate_into, find_fundamental, EstimateParams, EstimationReport, FundamentalEstimate,
    FundamentalSolver, Method, Solver,
};
