use serde::{Deserialize, Serialize};

pub type Number = f64;

pub type Point2 = nalgebra::Point2<Number>;

pub type Vector3 = nalgebra::Vector3<Number>;
pub type Vector9 = nalgebra::SVector<Number, 9>;

pub type Matrix3 = nalgebra::Matrix3<Number>;
pub type Matrix9 = nalgebra::SMatrix<Number, 9, 9>;

/// Up to three 3x3 candidates stacked vertically.
pub type Matrix9x3 = nalgebra::SMatrix<Number, 9, 3>;

/// Near-zero thresholds used by the kernels.
///
/// The defaults are the values the estimators have always used; they are
/// exposed so callers and tests can probe the boundaries directly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Minimum mean distance to the centroid accepted by the point normalizer.
    pub scale_epsilon: Number,
    /// Relative eigenvalue magnitude (scaled by `9 · λ_max`) below which the
    /// 8-point normal matrix is considered rank deficient in that direction.
    pub rank_epsilon: Number,
    /// `F(3,3)` magnitude required to rescale an 8-point solution.
    pub eight_point_unit_epsilon: Number,
    /// `F(3,3)` magnitude required to rescale a 7-point candidate.
    pub seven_point_unit_epsilon: Number,
    /// Area threshold (relative to the edge lengths) for collinear sample triples.
    pub collinear_epsilon: Number,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            scale_epsilon: f32::EPSILON as Number,
            rank_epsilon: Number::EPSILON,
            eight_point_unit_epsilon: f32::EPSILON as Number,
            seven_point_unit_epsilon: Number::EPSILON,
            collinear_epsilon: f32::EPSILON as Number,
        }
    }
}
