use super::super::base::{ErrorMetric, MinimalSampleKernel};
use super::super::common::normalize;
use super::super::polynomial::solve_cubic;
use crate::error::FundamentalError;
use crate::num::{Matrix3, Matrix9, Number, Point2, Tolerances, Vector3, Vector9};

use itertools::Itertools;
use log::trace;

mod consts {
    pub const SEVEN_POINTS: usize = 7;
    pub const EIGHT_POINTS: usize = 8;
    pub const UNKNOWNS: f64 = 9.0;

    // sweeps allowed to the iterative decompositions
    pub const MAX_DECOMPOSITION_ITERS: usize = 1000;
}

/// Which image a set of points was observed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageIndex {
    First,
    Second,
}

/// The fundamental-matrix capabilities handed to the robust sampler: the
/// 7-point minimal solver and the symmetric epipolar error.
#[derive(Clone, Copy, Debug, Default)]
pub struct FundamentalKernel {
    pub tolerances: Tolerances,
}

impl FundamentalKernel {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

impl MinimalSampleKernel for FundamentalKernel {
    type Model = Matrix3;

    const SAMPLE_SIZE: usize = consts::SEVEN_POINTS;

    fn solve(&self, points0: &[Point2], points1: &[Point2]) -> Vec<Matrix3> {
        match run_7point(points0, points1, &self.tolerances) {
            Ok(candidates) => candidates,
            Err(e) => {
                trace!("7-point kernel rejected sample: {}", e);
                vec![]
            }
        }
    }

    fn is_degenerate_sample(&self, points0: &[Point2], points1: &[Point2]) -> bool {
        let eps = self.tolerances.collinear_epsilon;
        has_collinear_triple(points0, eps) || has_collinear_triple(points1, eps)
    }
}

impl ErrorMetric<Matrix3> for FundamentalKernel {
    #[inline]
    fn errors(
        &self,
        model: &Matrix3,
        points0: &[Point2],
        points1: &[Point2],
        errors: &mut Vec<Number>,
    ) {
        reprojection_errors(model, points0, points1, errors);
    }
}

/// Normalized 8-point algorithm.
///
/// The normal matrix `AᵗA` is accumulated directly from the normalized
/// correspondences, so memory stays constant in the number of points. Its
/// eigenvector of the smallest eigenvalue gives the unconstrained solution,
/// which is then projected to rank 2 and denormalized.
///
/// Fails when either point set is coincident, or when any of the eight largest
/// eigenvalues of the normal matrix is numerically zero, i.e. below
/// `9 · tolerances.rank_epsilon · λ_max`.
pub fn run_8point(
    points0: &[Point2],
    points1: &[Point2],
    tolerances: &Tolerances,
) -> Result<Matrix3, FundamentalError> {
    check_lengths(points0, points1, consts::EIGHT_POINTS)?;

    // 0. Normalize keypoint coordinates
    let (normalized0, transform0) = normalize(points0, tolerances.scale_epsilon)?;
    let (normalized1, transform1) = normalize(points1, tolerances.scale_epsilon)?;

    // 1. Accumulate the normal equations
    let mut normal = Matrix9::zeros();
    for (p0, p1) in normalized0.iter().zip(normalized1.iter()) {
        let row = epipolar_row(p0, p1);
        normal.ger(1.0, &row, &row, 1.0);
    }

    // 2. Least-squares solution and rank check
    let eigen = normal
        .try_symmetric_eigen(Number::EPSILON, consts::MAX_DECOMPOSITION_ITERS)
        .ok_or(FundamentalError::Svd("eigen decomposition did not converge"))?;
    let mut order = (0..9).collect_vec();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    // eigenvalues are compared relative to the largest one
    let rank_threshold = tolerances.rank_epsilon * consts::UNKNOWNS * eigen.eigenvalues[order[0]];
    let is_near_zero = |w: &Number| w.abs() < rank_threshold;

    let first_near_zero = order
        .iter()
        .position(|&i| is_near_zero(&eigen.eigenvalues[i]))
        .unwrap_or(order.len());
    if first_near_zero < consts::EIGHT_POINTS {
        let near_zero = eigen.eigenvalues.iter().filter(|w| is_near_zero(w)).count();
        trace!(
            "8-point normal matrix is rank deficient: eigenvalues {:?}",
            eigen.eigenvalues.as_slice()
        );
        return Err(FundamentalError::RankDeficiency { near_zero });
    }

    let smallest: Vector9 = eigen.eigenvectors.column(order[8]).into_owned();
    let unconstrained = Matrix3::from_row_slice(smallest.as_slice());

    // 3. Enforce rank 2
    let rank2 = enforce_rank2(unconstrained)?;

    // 4. Undo the normalization: F = T1ᵗ F T0
    let f = transform1.matrix().transpose() * rank2 * transform0.matrix();

    Ok(unit_scaled(f, tolerances.eight_point_unit_epsilon))
}

/// 7-point algorithm on the first seven correspondences, in the coordinates
/// given (no normalization).
///
/// The two-dimensional null space of the 7x9 system spans the pencil
/// `λ·F1 + (1 - λ)·F2`; `det = 0` on the pencil is a cubic in `λ`, and every
/// real root yields one candidate.
pub fn run_7point(
    points0: &[Point2],
    points1: &[Point2],
    tolerances: &Tolerances,
) -> Result<Vec<Matrix3>, FundamentalError> {
    check_lengths(points0, points1, consts::SEVEN_POINTS)?;

    // 7 equations for 9 unknowns; the two zero rows keep the SVD square so
    // that all nine right singular vectors are available
    let mut system = Matrix9::zeros();
    for (i, (p0, p1)) in points0
        .iter()
        .zip(points1.iter())
        .take(consts::SEVEN_POINTS)
        .enumerate()
    {
        system.set_row(i, &epipolar_row(p0, p1).transpose());
    }

    let svd = system
        .try_svd(false, true, Number::EPSILON, consts::MAX_DECOMPOSITION_ITERS)
        .ok_or(FundamentalError::Svd("SVD did not converge"))?;
    let v_t = svd.v_t.ok_or(FundamentalError::Svd("right singular vectors missing"))?;

    let mut order = (0..9).collect_vec();
    order.sort_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));

    // f2 spans the smallest singular value, f1 the second smallest
    let f2: [Number; 9] = std::array::from_fn(|k| v_t[(order[0], k)]);
    let mut f1: [Number; 9] = std::array::from_fn(|k| v_t[(order[1], k)]);
    for (a, b) in f1.iter_mut().zip(f2.iter()) {
        *a -= b;
    }

    let coeffs = pencil_determinant(&f1, &f2);
    let roots = match solve_cubic(coeffs) {
        Some(roots) if (1..=3).contains(&roots.len()) => roots,
        Some(roots) => {
            return Err(FundamentalError::CubicSolve {
                roots: roots.len() as i32,
            })
        }
        None => return Err(FundamentalError::CubicSolve { roots: -1 }),
    };

    let candidates = roots
        .into_iter()
        .map(|root| {
            let mut lambda = root;
            let mut mu = 1.0;
            let s = f1[8] * root + f2[8];

            let mut f = [0.0; 9];
            if s.abs() > tolerances.seven_point_unit_epsilon {
                mu = 1.0 / s;
                lambda *= mu;
                f[8] = 1.0;
            } else {
                f[8] = 0.0;
            }
            for i in 0..8 {
                f[i] = f1[i] * lambda + f2[i] * mu;
            }
            Matrix3::from_row_slice(&f)
        })
        .collect();

    Ok(candidates)
}

/// Coefficients (highest degree first) of `det(λ·f1 + f2)` for row-major 3x3
/// matrices, expanded along cofactors.
fn pencil_determinant(f1: &[Number; 9], f2: &[Number; 9]) -> [Number; 4] {
    let mut c = [0.0; 4];

    let t0 = f2[4] * f2[8] - f2[5] * f2[7];
    let t1 = f2[3] * f2[8] - f2[5] * f2[6];
    let t2 = f2[3] * f2[7] - f2[4] * f2[6];

    c[3] = f2[0] * t0 - f2[1] * t1 + f2[2] * t2;

    c[2] = f1[0] * t0 - f1[1] * t1 + f1[2] * t2 - f1[3] * (f2[1] * f2[8] - f2[2] * f2[7])
        + f1[4] * (f2[0] * f2[8] - f2[2] * f2[6])
        - f1[5] * (f2[0] * f2[7] - f2[1] * f2[6])
        + f1[6] * (f2[1] * f2[5] - f2[2] * f2[4])
        - f1[7] * (f2[0] * f2[5] - f2[2] * f2[3])
        + f1[8] * (f2[0] * f2[4] - f2[1] * f2[3]);

    let t0 = f1[4] * f1[8] - f1[5] * f1[7];
    let t1 = f1[3] * f1[8] - f1[5] * f1[6];
    let t2 = f1[3] * f1[7] - f1[4] * f1[6];

    c[1] = f2[0] * t0 - f2[1] * t1 + f2[2] * t2 - f2[3] * (f1[1] * f1[8] - f1[2] * f1[7])
        + f2[4] * (f1[0] * f1[8] - f1[2] * f1[6])
        - f2[5] * (f1[0] * f1[7] - f1[1] * f1[6])
        + f2[6] * (f1[1] * f1[5] - f1[2] * f1[4])
        - f2[7] * (f1[0] * f1[5] - f1[2] * f1[3])
        + f2[8] * (f1[0] * f1[4] - f1[1] * f1[3]);

    c[0] = f1[0] * t0 - f1[1] * t1 + f1[2] * t2;

    c
}

/// Bilinear monomials of `(p1, 1)ᵗ·F·(p0, 1)` in row-major order of `F`.
#[inline]
fn epipolar_row(p0: &Point2, p1: &Point2) -> Vector9 {
    let (x0, y0) = (p0.x, p0.y);
    let (x1, y1) = (p1.x, p1.y);
    Vector9::from_column_slice(&[
        x1 * x0,
        x1 * y0,
        x1,
        y1 * x0,
        y1 * y0,
        y1,
        x0,
        y0,
        1.0,
    ])
}

fn enforce_rank2(f: Matrix3) -> Result<Matrix3, FundamentalError> {
    let mut svd = f
        .try_svd(true, true, Number::EPSILON, consts::MAX_DECOMPOSITION_ITERS)
        .ok_or(FundamentalError::Svd("SVD did not converge"))?;
    let smallest = svd.singular_values.imin();
    svd.singular_values[smallest] = 0.0;
    svd.recompose().map_err(FundamentalError::Svd)
}

/// Scale so that `F(3,3) == 1`, or pin it to zero when it vanishes.
#[inline]
fn unit_scaled(mut f: Matrix3, eps: Number) -> Matrix3 {
    let f33 = f[(2, 2)];
    if f33.abs() > eps {
        f /= f33;
    } else {
        f[(2, 2)] = 0.0;
    }
    f
}

fn check_lengths(
    points0: &[Point2],
    points1: &[Point2],
    required: usize,
) -> Result<(), FundamentalError> {
    if points0.len() != points1.len() {
        return Err(FundamentalError::MismatchedLengths {
            left: points0.len(),
            right: points1.len(),
        });
    }
    if points0.len() < required {
        return Err(FundamentalError::InsufficientPoints {
            required,
            actual: points0.len(),
        });
    }
    check_finite(points0, points1)
}

/// Fails on the first correspondence with a NaN or infinite coordinate.
pub(crate) fn check_finite(
    points0: &[Point2],
    points1: &[Point2],
) -> Result<(), FundamentalError> {
    let is_finite = |p: &Point2| p.x.is_finite() && p.y.is_finite();
    match points0
        .iter()
        .zip(points1.iter())
        .position(|(p0, p1)| !is_finite(p0) || !is_finite(p1))
    {
        Some(index) => Err(FundamentalError::NonFiniteInput { index }),
        None => Ok(()),
    }
}

fn has_collinear_triple(points: &[Point2], eps: Number) -> bool {
    points.iter().tuple_combinations().any(|(a, b, c)| {
        let (dx1, dy1) = (b.x - a.x, b.y - a.y);
        let (dx2, dy2) = (c.x - a.x, c.y - a.y);
        (dx2 * dy1 - dy2 * dx1).abs() <= eps * (dx1.abs() + dy1.abs() + dx2.abs() + dy2.abs())
    })
}

/// Squared distance from `(x, y)` to the line `a·x + b·y + c = 0`.
#[inline]
fn line_distance_sq(a: Number, b: Number, c: Number, x: Number, y: Number) -> Number {
    let d = a * x + b * y + c;
    let norm_sq = a * a + b * b;
    if norm_sq > 0.0 {
        d * d / norm_sq
    } else if d == 0.0 {
        0.0
    } else {
        Number::INFINITY
    }
}

/// Symmetric epipolar error of one correspondence.
///
/// The larger of the squared distances between `p1` and the epipolar line
/// `F·p0`, and between `p0` and `Fᵗ·p1`.
#[inline]
pub fn reprojection_error(f: &Matrix3, p0: &Point2, p1: &Point2) -> Number {
    // epipolar line of p0 in the second image
    let a = f[(0, 0)] * p0.x + f[(0, 1)] * p0.y + f[(0, 2)];
    let b = f[(1, 0)] * p0.x + f[(1, 1)] * p0.y + f[(1, 2)];
    let c = f[(2, 0)] * p0.x + f[(2, 1)] * p0.y + f[(2, 2)];
    let dist_sq_1 = line_distance_sq(a, b, c, p1.x, p1.y);

    // epipolar line of p1 in the first image
    let a = f[(0, 0)] * p1.x + f[(1, 0)] * p1.y + f[(2, 0)];
    let b = f[(0, 1)] * p1.x + f[(1, 1)] * p1.y + f[(2, 1)];
    let c = f[(0, 2)] * p1.x + f[(1, 2)] * p1.y + f[(2, 2)];
    let dist_sq_0 = line_distance_sq(a, b, c, p0.x, p0.y);

    dist_sq_0.max(dist_sq_1)
}

/// [`reprojection_error`] for every correspondence, written into `errors`.
pub fn reprojection_errors(
    f: &Matrix3,
    points0: &[Point2],
    points1: &[Point2],
    errors: &mut Vec<Number>,
) {
    errors.clear();
    errors.extend(
        points0
            .iter()
            .zip(points1.iter())
            .map(|(p0, p1)| reprojection_error(f, p0, p1)),
    );
}

/// Epipolar lines in the other image for points observed in `image`.
///
/// Each line `(a, b, c)` is scaled so that `a² + b² = 1`.
pub fn compute_correspond_epilines(
    points: &[Point2],
    image: ImageIndex,
    f: &Matrix3,
) -> Vec<Vector3> {
    let f = match image {
        ImageIndex::First => *f,
        ImageIndex::Second => f.transpose(),
    };
    points
        .iter()
        .map(|p| {
            let line = f * p.to_homogeneous();
            let norm = line.x.hypot(line.y);
            if norm > 0.0 {
                line / norm
            } else {
                line
            }
        })
        .collect()
}
