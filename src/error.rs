use thiserror::Error;

/// Errors raised while estimating a fundamental matrix.
///
/// Kernel-level variants (`DegenerateScale`, `RankDeficiency`, `CubicSolve`)
/// mean the kernel produced no candidate for the given points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FundamentalError {
    /// Fewer correspondences than the chosen path needs.
    #[error("need at least {required} correspondences, got {actual}")]
    InsufficientPoints {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences supplied.
        actual: usize,
    },

    /// The two point sets differ in length.
    #[error("mismatched point sets: {left} points in the first image, {right} in the second")]
    MismatchedLengths {
        /// Length of the first point set.
        left: usize,
        /// Length of the second point set.
        right: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("correspondence {index} has a non-finite coordinate")]
    NonFiniteInput {
        /// Position of the first offending correspondence.
        index: usize,
    },

    /// The points of one image coincide, so no normalization scale exists.
    #[error("points are coincident, normalization scale is undefined")]
    DegenerateScale,

    /// More than one eigenvalue of the normal matrix is numerically zero.
    #[error(
        "correspondences do not determine a unique solution ({near_zero} near-zero eigenvalues)"
    )]
    RankDeficiency {
        /// Number of eigenvalues below the rank tolerance.
        near_zero: usize,
    },

    /// The determinant cubic has no usable real roots (`-1` means every value is a root).
    #[error("determinant constraint yielded {roots} real roots")]
    CubicSolve {
        /// Root count reported by the cubic solver.
        roots: i32,
    },

    /// A matrix decomposition did not produce the requested factors.
    #[error("matrix decomposition failed: {0}")]
    Svd(&'static str),

    /// The robust sampler found no consensus model.
    #[error("robust estimation failed to find a consensus model")]
    RobustEstimationFailure,

    /// A caller-supplied mask does not match the number of correspondences.
    #[error("inlier mask has length {actual}, expected {expected}")]
    InvalidMaskLength {
        /// Number of correspondences.
        expected: usize,
        /// Length of the supplied mask.
        actual: usize,
    },
}
