use super::super::base::Solver;
use super::super::common::{compact, convert_points_homogeneous};
use super::super::sac::{RobustSampler, SacEngine, SacOutcome, SacParams};
use super::fundamental::{check_finite, run_7point, run_8point, FundamentalKernel};
use crate::error::FundamentalError;
use crate::num::{Matrix3, Matrix9x3, Number, Point2, Tolerances, Vector3};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

mod consts {
    pub const SEVEN_POINTS: usize = 7;
    pub const EIGHT_POINTS: usize = 8;
    pub const MIN_RANSAC_POINTS: usize = 15;

    pub const DEFAULT_THRESHOLD: f64 = 3.0;
    pub const DEFAULT_CONFIDENCE: f64 = 0.99;
    pub const DEFAULT_MAX_ITERS: usize = 2000;
}

/// Estimation strategy requested by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// 7-point algorithm; only runs on exactly seven correspondences.
    Exact7,
    /// Normalized 8-point algorithm on every correspondence.
    Linear8,
    /// RANSAC over 7-point samples, polished by the 8-point algorithm.
    #[default]
    Ransac,
    /// Least median of squares over 7-point samples, polished by the 8-point algorithm.
    Lmeds,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimateParams {
    pub method: Method,
    /// Maximum epipolar distance (in pixels) of a RANSAC inlier.
    pub threshold: Number,
    /// Desired confidence that the robust estimate is correct.
    pub confidence: Number,
    pub max_iters: usize,
    /// Seed for the reference sampler; `None` seeds from the OS.
    pub random_seed: Option<u64>,
    pub tolerances: Tolerances,
}

impl Default for EstimateParams {
    fn default() -> Self {
        Self {
            method: Method::default(),
            threshold: consts::DEFAULT_THRESHOLD,
            confidence: consts::DEFAULT_CONFIDENCE,
            max_iters: consts::DEFAULT_MAX_ITERS,
            random_seed: None,
            tolerances: Tolerances::default(),
        }
    }
}

impl EstimateParams {
    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Robust-sampler parameters with out-of-range values replaced by the defaults.
    fn sac_params(&self, max_iters: usize) -> SacParams {
        let threshold = if self.threshold > 0.0 {
            self.threshold
        } else {
            consts::DEFAULT_THRESHOLD
        };
        let confidence =
            if self.confidence >= Number::EPSILON && self.confidence <= 1.0 - Number::EPSILON {
                self.confidence
            } else {
                consts::DEFAULT_CONFIDENCE
            };
        SacParams {
            threshold,
            confidence,
            max_iters,
        }
    }
}

/// Outcome of a successful estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct FundamentalEstimate {
    /// One to three candidates on the exact path, exactly one otherwise.
    pub candidates: Vec<Matrix3>,
    /// Robust classification of every correspondence; `None` when all were used.
    pub inliers: Option<Vec<bool>>,
    /// The strategy that actually ran.
    pub method: Method,
    pub iterations: usize,
    pub max_iters_reached: bool,
    num_points: usize,
}

impl FundamentalEstimate {
    /// The first (on every path but the exact one, the only) candidate.
    #[inline]
    pub fn matrix(&self) -> Matrix3 {
        self.candidates[0]
    }

    /// Candidates stacked vertically; unused rows are zero.
    pub fn stacked(&self) -> Matrix9x3 {
        let mut stacked = Matrix9x3::zeros();
        for (i, f) in self.candidates.iter().take(3).enumerate() {
            stacked.fixed_view_mut::<3, 3>(3 * i, 0).copy_from(f);
        }
        stacked
    }

    pub fn inlier_count(&self) -> usize {
        match &self.inliers {
            Some(mask) => mask.iter().filter(|x| **x).count(),
            None => self.num_points,
        }
    }

    pub fn report(&self) -> EstimationReport {
        EstimationReport {
            success: true,
            iterations: self.iterations,
            max_iters_reached: self.max_iters_reached,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationReport {
    pub success: bool,
    pub iterations: usize,
    pub max_iters_reached: bool,
}

/// Fundamental matrix `F` with `p1ᵗ·F·p0 = 0` for every correspondence
/// `p0 <-> p1`.
pub struct FundamentalSolver<'a> {
    pub points0: &'a [Point2],
    pub points1: &'a [Point2],

    pub params: EstimateParams,
}

impl<'a> Solver<Result<FundamentalEstimate, FundamentalError>> for FundamentalSolver<'a> {
    const MAX_ITER: usize = consts::DEFAULT_MAX_ITERS;

    /// `repeat` caps the robust sampling iterations.
    fn solve(self, repeat: usize) -> Result<FundamentalEstimate, FundamentalError> {
        let mut sampler = SacEngine::new(self.params.random_seed);
        self.solve_with(&mut sampler, repeat)
    }
}

impl<'a> FundamentalSolver<'a> {
    pub fn new(points0: &'a [Point2], points1: &'a [Point2], params: EstimateParams) -> Self {
        Self {
            points0,
            points1,
            params,
        }
    }

    /// Estimate from homogeneous coordinates.
    pub fn from_homogeneous(
        points0: &[Vector3],
        points1: &[Vector3],
        params: &EstimateParams,
    ) -> Result<FundamentalEstimate, FundamentalError> {
        let points0 = convert_points_homogeneous(points0);
        let points1 = convert_points_homogeneous(points1);
        find_fundamental(&points0, &points1, params)
    }

    /// Run the estimation with a caller-supplied robust sampler.
    pub fn solve_with<S>(
        self,
        sampler: &mut S,
        repeat: usize,
    ) -> Result<FundamentalEstimate, FundamentalError>
    where
        S: RobustSampler,
    {
        let num_points = self.points0.len();
        if self.points1.len() != num_points {
            return Err(FundamentalError::MismatchedLengths {
                left: num_points,
                right: self.points1.len(),
            });
        }
        if num_points < consts::SEVEN_POINTS {
            return Err(FundamentalError::InsufficientPoints {
                required: consts::SEVEN_POINTS,
                actual: num_points,
            });
        }
        check_finite(self.points0, self.points1)?;

        let tolerances = &self.params.tolerances;

        // 1. Exact path
        if num_points == consts::SEVEN_POINTS {
            debug!("7 correspondences, running the 7-point algorithm");
            let candidates = run_7point(self.points0, self.points1, tolerances)?;
            return Ok(FundamentalEstimate {
                candidates,
                inliers: None,
                method: Method::Exact7,
                iterations: 0,
                max_iters_reached: false,
                num_points,
            });
        }

        // 2. Linear path
        if self.params.method == Method::Linear8 {
            debug!("{} correspondences, running the 8-point algorithm", num_points);
            let f = run_8point(self.points0, self.points1, tolerances)?;
            return Ok(FundamentalEstimate {
                candidates: vec![f],
                inliers: None,
                method: Method::Linear8,
                iterations: 0,
                max_iters_reached: false,
                num_points,
            });
        }

        // 3. Robust path
        let sac_params = self.params.sac_params(repeat);
        let kernel = FundamentalKernel::new(*tolerances);

        let use_ransac =
            self.params.method == Method::Ransac && num_points >= consts::MIN_RANSAC_POINTS;
        let (method, outcome) = if use_ransac {
            debug!(
                "RANSAC on {} correspondences (threshold {}, confidence {})",
                num_points, sac_params.threshold, sac_params.confidence
            );
            let outcome = sampler.ransac(&kernel, &kernel, self.points0, self.points1, &sac_params);
            (Method::Ransac, outcome)
        } else {
            debug!(
                "LMedS on {} correspondences (confidence {})",
                num_points, sac_params.confidence
            );
            let outcome = sampler.lmeds(&kernel, &kernel, self.points0, self.points1, &sac_params);
            (Method::Lmeds, outcome)
        };

        let SacOutcome {
            mask, iterations, ..
        } = outcome.ok_or(FundamentalError::RobustEstimationFailure)?;

        let max_iters_reached = iterations == repeat;
        if max_iters_reached {
            warn!("robust estimation stopped at the iteration cap ({})", repeat);
        }

        // 4. Polish with the inliers only
        let inliers0 = compact(self.points0, &mask);
        let inliers1 = compact(self.points1, &mask);
        debug!(
            "{:?} kept {} of {} correspondences after {} iterations",
            method,
            inliers0.len(),
            num_points,
            iterations
        );
        if inliers0.len() < consts::EIGHT_POINTS {
            return Err(FundamentalError::RobustEstimationFailure);
        }
        let f = run_8point(&inliers0, &inliers1, tolerances)?;

        Ok(FundamentalEstimate {
            candidates: vec![f],
            inliers: Some(mask),
            method,
            iterations,
            max_iters_reached,
            num_points,
        })
    }
}

/// Estimate with the iteration cap taken from `params.max_iters`.
pub fn find_fundamental(
    points0: &[Point2],
    points1: &[Point2],
    params: &EstimateParams,
) -> Result<FundamentalEstimate, FundamentalError> {
    FundamentalSolver::new(points0, points1, params.clone()).solve(params.max_iters)
}

/// Buffer-style entry point.
///
/// On success the candidates are copied into `out` (as many as fit) and, when
/// given, `mask` receives the inlier flags (all set on the exact and linear
/// paths). On failure neither buffer is touched; an empty `out` is a failure.
pub fn estimate_into(
    points0: &[Point2],
    points1: &[Point2],
    params: &EstimateParams,
    out: &mut [Matrix3],
    mask: Option<&mut [bool]>,
) -> EstimationReport {
    if out.is_empty() {
        debug!("no room for the estimated matrix");
        return EstimationReport::default();
    }
    if let Some(mask) = &mask {
        if mask.len() != points0.len() {
            debug!(
                "{}",
                FundamentalError::InvalidMaskLength {
                    expected: points0.len(),
                    actual: mask.len(),
                }
            );
            return EstimationReport::default();
        }
    }

    let estimate = match find_fundamental(points0, points1, params) {
        Ok(estimate) => estimate,
        Err(e) => {
            debug!("fundamental matrix estimation failed: {}", e);
            return EstimationReport::default();
        }
    };

    for (dst, src) in out.iter_mut().zip(estimate.candidates.iter()) {
        *dst = *src;
    }
    if let Some(mask) = mask {
        match &estimate.inliers {
            Some(inliers) => mask.copy_from_slice(inliers),
            None => mask.fill(true),
        }
    }

    estimate.report()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{reprojection_error, ErrorMetric, MinimalSampleKernel};
    use crate::synthetic::TwoViewScene;
    use approx::assert_relative_eq;

    fn seeded(method: Method) -> EstimateParams {
        EstimateParams {
            random_seed: Some(17),
            ..EstimateParams::with_method(method)
        }
    }

    fn run_scene(scene: &TwoViewScene, method: Method) -> FundamentalEstimate {
        find_fundamental(&scene.points0, &scene.points1, &seeded(method)).unwrap()
    }

    #[test]
    fn seven_points_always_take_the_exact_path() {
        let scene = TwoViewScene::generate(7, 1.0, 42);
        for method in [Method::Exact7, Method::Linear8, Method::Ransac, Method::Lmeds] {
            let estimate = run_scene(&scene, method);
            assert_eq!(estimate.method, Method::Exact7);
            assert!(estimate.inliers.is_none());
            assert_eq!(estimate.inlier_count(), 7);
            assert_eq!(estimate.report().iterations, 0);
            assert!((1..=3).contains(&estimate.candidates.len()));
        }
    }

    #[test]
    fn stacked_candidates_fill_rows_in_order() {
        let scene = TwoViewScene::generate(7, 1.0, 42);
        let estimate = run_scene(&scene, Method::Exact7);
        let stacked = estimate.stacked();
        for (i, f) in estimate.candidates.iter().enumerate() {
            assert_eq!(stacked.fixed_view::<3, 3>(3 * i, 0).into_owned(), *f);
        }
        for row in 3 * estimate.candidates.len()..9 {
            assert!(stacked.row(row).iter().all(|x| *x == 0.0));
        }
    }

    #[test]
    fn too_few_points_fail_before_any_work() {
        let scene = TwoViewScene::generate(6, 1.0, 1);
        assert_eq!(
            find_fundamental(&scene.points0, &scene.points1, &seeded(Method::Ransac)),
            Err(FundamentalError::InsufficientPoints {
                required: 7,
                actual: 6
            })
        );
        assert!(matches!(
            find_fundamental(&scene.points0, &scene.points1[..5], &seeded(Method::Ransac)),
            Err(FundamentalError::MismatchedLengths { left: 6, right: 5 })
        ));
    }

    #[test]
    fn linear_path_uses_every_point() {
        let scene = TwoViewScene::generate(20, 800.0, 2);
        let estimate = run_scene(&scene, Method::Linear8);
        assert_eq!(estimate.method, Method::Linear8);
        assert_eq!(estimate.candidates.len(), 1);
        assert_eq!(estimate.inlier_count(), 20);
        assert!(!estimate.max_iters_reached);
        assert_relative_eq!(
            estimate.matrix(),
            scene.fundamental,
            epsilon = 1e-12,
            max_relative = 1e-6
        );
    }

    #[test]
    fn small_ransac_requests_fall_back_to_lmeds() {
        let scene = TwoViewScene::generate(14, 800.0, 3);
        let estimate = run_scene(&scene, Method::Ransac);
        assert_eq!(estimate.method, Method::Lmeds);
        assert_eq!(estimate.inliers, Some(vec![true; 14]));

        // an exact request on more than seven points is treated as robust too
        let estimate = run_scene(&scene, Method::Exact7);
        assert_eq!(estimate.method, Method::Lmeds);
    }

    #[test]
    fn polishing_outlier_free_data_is_stable() {
        let scene = TwoViewScene::generate(40, 800.0, 4);
        let robust = run_scene(&scene, Method::Ransac);
        let linear = run_scene(&scene, Method::Linear8);

        assert_eq!(robust.method, Method::Ransac);
        assert_eq!(robust.inlier_count(), 40);
        // every point is an inlier, so the polished model is the plain 8-point one
        assert_relative_eq!(robust.matrix(), linear.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_parameters_are_replaced() {
        let params = EstimateParams {
            threshold: -1.0,
            confidence: 1.5,
            ..Default::default()
        };
        let sac = params.sac_params(100);
        assert_eq!(sac.threshold, 3.0);
        assert_eq!(sac.confidence, 0.99);
        assert_eq!(sac.max_iters, 100);

        let params = EstimateParams {
            threshold: 0.5,
            confidence: 0.95,
            ..Default::default()
        };
        let sac = params.sac_params(100);
        assert_eq!(sac.threshold, 0.5);
        assert_eq!(sac.confidence, 0.95);
    }

    /// Sampler replaying a fixed classification.
    struct FixedOutcome {
        mask: Option<Vec<bool>>,
        iterations: usize,
    }

    impl RobustSampler for FixedOutcome {
        fn ransac<K, E>(
            &mut self,
            kernel: &K,
            _metric: &E,
            points0: &[Point2],
            points1: &[Point2],
            _params: &SacParams,
        ) -> Option<SacOutcome<K::Model>>
        where
            K: MinimalSampleKernel,
            E: ErrorMetric<K::Model>,
        {
            let mask = self.mask.clone()?;
            let model = kernel
                .solve(&points0[..K::SAMPLE_SIZE], &points1[..K::SAMPLE_SIZE])
                .into_iter()
                .next()?;
            Some(SacOutcome {
                model,
                mask,
                iterations: self.iterations,
            })
        }

        fn lmeds<K, E>(
            &mut self,
            kernel: &K,
            metric: &E,
            points0: &[Point2],
            points1: &[Point2],
            params: &SacParams,
        ) -> Option<SacOutcome<K::Model>>
        where
            K: MinimalSampleKernel,
            E: ErrorMetric<K::Model>,
        {
            self.ransac(kernel, metric, points0, points1, params)
        }
    }

    #[test]
    fn iteration_cap_is_reported() {
        let scene = TwoViewScene::generate(20, 800.0, 5);
        let mut sampler = FixedOutcome {
            mask: Some(vec![true; 20]),
            iterations: 3,
        };
        let solver = FundamentalSolver::new(&scene.points0, &scene.points1, seeded(Method::Ransac));
        let estimate = solver.solve_with(&mut sampler, 3).unwrap();
        assert_eq!(estimate.iterations, 3);
        assert!(estimate.max_iters_reached);
        assert!(estimate.report().success);

        let mut sampler = FixedOutcome {
            mask: Some(vec![true; 20]),
            iterations: 2,
        };
        let solver = FundamentalSolver::new(&scene.points0, &scene.points1, seeded(Method::Ransac));
        let estimate = solver.solve_with(&mut sampler, 3).unwrap();
        assert!(!estimate.max_iters_reached);
    }

    #[test]
    fn robust_failure_skips_polishing() {
        let scene = TwoViewScene::generate(20, 800.0, 6);
        let mut sampler = FixedOutcome {
            mask: None,
            iterations: 0,
        };
        assert_eq!(
            FundamentalSolver::new(&scene.points0, &scene.points1, seeded(Method::Ransac))
                .solve_with(&mut sampler, 100),
            Err(FundamentalError::RobustEstimationFailure)
        );

        // seven inliers are not enough for the 8-point polish
        let mut mask = vec![false; 20];
        mask[..7].fill(true);
        let mut sampler = FixedOutcome {
            mask: Some(mask),
            iterations: 10,
        };
        assert_eq!(
            FundamentalSolver::new(&scene.points0, &scene.points1, seeded(Method::Lmeds))
                .solve_with(&mut sampler, 100),
            Err(FundamentalError::RobustEstimationFailure)
        );
    }

    #[test]
    fn buffers_are_untouched_on_failure() {
        let scene = TwoViewScene::generate(20, 800.0, 7);
        let params = seeded(Method::Linear8);

        let mut out = [Matrix3::identity(); 3];
        let mut mask = vec![false; 20];
        let report = estimate_into(
            &scene.points0,
            &scene.points1,
            &params,
            &mut out,
            Some(&mut mask[..]),
        );
        assert!(report.success);
        assert_eq!(report.iterations, 0);
        assert_relative_eq!(out[0], scene.fundamental, epsilon = 1e-12, max_relative = 1e-6);
        assert_eq!(out[1], Matrix3::identity());
        assert!(mask.iter().all(|x| *x));

        let mut out = [Matrix3::identity(); 1];
        let mut short_mask = vec![false; 19];
        let report = estimate_into(
            &scene.points0,
            &scene.points1,
            &params,
            &mut out,
            Some(&mut short_mask[..]),
        );
        assert_eq!(report, EstimationReport::default());
        assert_eq!(out[0], Matrix3::identity());
        assert!(short_mask.iter().all(|x| !*x));

        let (short0, short1) = (&scene.points0[..6], &scene.points1[..6]);
        let report = estimate_into(short0, short1, &params, &mut out, None);
        assert!(!report.success);
        assert_eq!(out[0], Matrix3::identity());

        // nowhere to write the matrix
        let mut mask = vec![false; 20];
        let report = estimate_into(
            &scene.points0,
            &scene.points1,
            &params,
            &mut [],
            Some(&mut mask[..]),
        );
        assert_eq!(report, EstimationReport::default());
        assert!(mask.iter().all(|x| !*x));
    }

    #[test]
    fn non_finite_input_fails_on_every_path() {
        let scene = TwoViewScene::generate(20, 800.0, 9);
        for method in [Method::Exact7, Method::Linear8, Method::Ransac, Method::Lmeds] {
            let mut points0 = scene.points0.clone();
            points0[2] = Point2::new(Number::NAN, 3.0);
            assert_eq!(
                find_fundamental(&points0[..7], &scene.points1[..7], &seeded(method)),
                Err(FundamentalError::NonFiniteInput { index: 2 })
            );
            assert_eq!(
                find_fundamental(&points0, &scene.points1, &seeded(method)),
                Err(FundamentalError::NonFiniteInput { index: 2 })
            );
        }
    }

    #[test]
    fn solve_to_end_uses_the_default_cap() {
        let mut scene = TwoViewScene::generate(25, 800.0, 10);
        scene.add_outliers(5, 25.0, 11);

        assert_eq!(
            <FundamentalSolver as Solver<Result<FundamentalEstimate, FundamentalError>>>::MAX_ITER,
            2000
        );
        let params = seeded(Method::Ransac);
        assert_eq!(params.max_iters, 2000);

        let to_end = FundamentalSolver::new(&scene.points0, &scene.points1, params.clone())
            .solve_to_end()
            .unwrap();
        let capped = find_fundamental(&scene.points0, &scene.points1, &params).unwrap();
        assert_eq!(to_end, capped);
        assert!(!to_end.max_iters_reached);
    }

    #[test]
    fn polished_matrix_is_the_eight_point_fit_of_the_inliers() {
        let mut scene = TwoViewScene::generate(30, 800.0, 12);
        let truth = scene.add_outliers(8, 25.0, 13);

        let estimate = run_scene(&scene, Method::Ransac);
        let mask = estimate.inliers.clone().unwrap();
        assert_eq!(mask, truth);

        let inliers0 = compact(&scene.points0, &mask);
        let inliers1 = compact(&scene.points1, &mask);
        let refit = run_8point(&inliers0, &inliers1, &Tolerances::default()).unwrap();
        assert_eq!(refit, estimate.matrix());
    }

    #[test]
    fn homogeneous_input_matches_cartesian() {
        let scene = TwoViewScene::generate(12, 500.0, 8);
        let to_h = |points: &[Point2], w: Number| {
            points
                .iter()
                .map(|p| Vector3::new(p.x * w, p.y * w, w))
                .collect::<Vec<_>>()
        };
        let params = seeded(Method::Linear8);
        let estimate = FundamentalSolver::from_homogeneous(
            &to_h(&scene.points0, 2.0),
            &to_h(&scene.points1, -0.5),
            &params,
        )
        .unwrap();
        for (p0, p1) in scene.points0.iter().zip(scene.points1.iter()) {
            assert!(reprojection_error(&estimate.matrix(), p0, p1) < 1e-10);
        }
    }
}
