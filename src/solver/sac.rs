//! Random-sample consensus engines driving a [`MinimalSampleKernel`].
//!
//! The estimators only rely on the [`RobustSampler`] trait; [`SacEngine`] is
//! the stock implementation of RANSAC and LMedS over a seeded `StdRng`.

use super::base::{ErrorMetric, MinimalSampleKernel};
use crate::num::{Number, Point2};

use itertools::Itertools;
use log::{debug, trace};
use rand::{rngs::StdRng, seq::index, SeedableRng};

mod consts {
    // redraws of a degenerate minimal sample before giving up
    pub const MAX_SUBSET_ATTEMPTS: usize = 300;

    pub const LMEDS_OUTLIER_RATIO: f64 = 0.45;
    pub const LMEDS_MIN_ITERS: usize = 3;
    pub const LMEDS_MIN_SIGMA: f64 = 0.001;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SacParams {
    /// Maximum distance for an inlier, in the units of the square root of the metric.
    pub threshold: Number,
    /// Desired probability of drawing at least one outlier-free sample.
    pub confidence: Number,
    pub max_iters: usize,
}

/// Accepted model with its consensus set.
#[derive(Clone, Debug)]
pub struct SacOutcome<M> {
    pub model: M,
    pub mask: Vec<bool>,
    /// Sampling iterations actually performed.
    pub iterations: usize,
}

impl<M> SacOutcome<M> {
    #[inline]
    pub fn inlier_count(&self) -> usize {
        self.mask.iter().filter(|x| **x).count()
    }
}

/// A robust estimator that turns a minimal solver and an error metric into a
/// single model. `None` means no consensus was found.
pub trait RobustSampler {
    fn ransac<K, E>(
        &mut self,
        kernel: &K,
        metric: &E,
        points0: &[Point2],
        points1: &[Point2],
        params: &SacParams,
    ) -> Option<SacOutcome<K::Model>>
    where
        K: MinimalSampleKernel,
        E: ErrorMetric<K::Model>;

    /// Least median of squares; `params.threshold` is not used.
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
        E: ErrorMetric<K::Model>;
}

pub struct SacEngine {
    rng: StdRng,
}

impl SacEngine {
    /// A fixed `seed` makes the sampling reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draw `K::SAMPLE_SIZE` distinct correspondences the kernel accepts.
    fn draw_subset<K>(
        &mut self,
        kernel: &K,
        points0: &[Point2],
        points1: &[Point2],
        sample0: &mut Vec<Point2>,
        sample1: &mut Vec<Point2>,
    ) -> bool
    where
        K: MinimalSampleKernel,
    {
        for _ in 0..consts::MAX_SUBSET_ATTEMPTS {
            sample0.clear();
            sample1.clear();
            for idx in index::sample(&mut self.rng, points0.len(), K::SAMPLE_SIZE).iter() {
                sample0.push(points0[idx]);
                sample1.push(points1[idx]);
            }
            if !kernel.is_degenerate_sample(sample0, sample1) {
                return true;
            }
        }
        false
    }
}

impl Default for SacEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RobustSampler for SacEngine {
    fn ransac<K, E>(
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
        let count = points0.len();
        if count < K::SAMPLE_SIZE || points1.len() != count {
            return None;
        }
        if count == K::SAMPLE_SIZE {
            return solve_all(kernel, points0, points1);
        }

        let threshold_sq = params.threshold * params.threshold;

        let mut sample0 = Vec::with_capacity(K::SAMPLE_SIZE);
        let mut sample1 = Vec::with_capacity(K::SAMPLE_SIZE);
        let mut errors = Vec::with_capacity(count);
        let mut mask_in_sac = vec![false; count];

        let mut best: Option<(K::Model, Vec<bool>)> = None;
        let mut max_good_count = 0;

        let mut num_iters = params.max_iters;
        let mut iter = 0;
        while iter < num_iters {
            if !self.draw_subset(kernel, points0, points1, &mut sample0, &mut sample1) {
                if iter == 0 {
                    debug!("RANSAC could not draw a non-degenerate sample");
                    return None;
                }
                break;
            }

            for model in kernel.solve(&sample0, &sample1) {
                metric.errors(&model, points0, points1, &mut errors);
                let good_count = find_inliers(&errors, threshold_sq, &mut mask_in_sac);

                if good_count > max_good_count.max(K::SAMPLE_SIZE - 1) {
                    max_good_count = good_count;
                    num_iters = update_num_iters(
                        params.confidence,
                        (count - good_count) as Number / count as Number,
                        K::SAMPLE_SIZE,
                        num_iters,
                    );
                    trace!(
                        "RANSAC iteration {}: {} inliers, bound {} iterations",
                        iter,
                        good_count,
                        num_iters
                    );
                    best = Some((model, mask_in_sac.clone()));
                }
            }
            iter += 1;
        }

        best.map(|(model, mask)| SacOutcome {
            model,
            mask,
            iterations: iter,
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
        let count = points0.len();
        if count < K::SAMPLE_SIZE || points1.len() != count {
            return None;
        }
        if count == K::SAMPLE_SIZE {
            return solve_all(kernel, points0, points1);
        }

        let num_iters = {
            let inlier_sample = (1.0 - consts::LMEDS_OUTLIER_RATIO).powi(K::SAMPLE_SIZE as i32);
            let n = ((1.0 - params.confidence).ln() / (1.0 - inlier_sample).ln()).round();
            (n as usize).max(consts::LMEDS_MIN_ITERS).min(params.max_iters)
        };

        let mut sample0 = Vec::with_capacity(K::SAMPLE_SIZE);
        let mut sample1 = Vec::with_capacity(K::SAMPLE_SIZE);
        let mut errors = Vec::with_capacity(count);

        let mut best: Option<K::Model> = None;
        let mut min_median = Number::MAX;

        let mut iter = 0;
        while iter < num_iters {
            if !self.draw_subset(kernel, points0, points1, &mut sample0, &mut sample1) {
                if iter == 0 {
                    debug!("LMedS could not draw a non-degenerate sample");
                    return None;
                }
                break;
            }

            for model in kernel.solve(&sample0, &sample1) {
                metric.errors(&model, points0, points1, &mut errors);
                let median = median(&errors);
                if median < min_median {
                    trace!("LMedS iteration {}: median error {}", iter, median);
                    min_median = median;
                    best = Some(model);
                }
            }
            iter += 1;
        }

        let model = best?;

        let sigma = 2.5
            * 1.4826
            * (1.0 + 5.0 / (count - K::SAMPLE_SIZE) as Number)
            * min_median.sqrt();
        let sigma = sigma.max(consts::LMEDS_MIN_SIGMA);

        metric.errors(&model, points0, points1, &mut errors);
        let mut mask = vec![false; count];
        let good_count = find_inliers(&errors, sigma * sigma, &mut mask);
        debug!(
            "LMedS median {} -> sigma {}, {} of {} inliers",
            min_median, sigma, good_count, count
        );

        if good_count < K::SAMPLE_SIZE {
            return None;
        }
        Some(SacOutcome {
            model,
            mask,
            iterations: iter,
        })
    }
}

/// A single kernel call on a set of exactly minimal size.
fn solve_all<K>(kernel: &K, points0: &[Point2], points1: &[Point2]) -> Option<SacOutcome<K::Model>>
where
    K: MinimalSampleKernel,
{
    let model = kernel.solve(points0, points1).into_iter().next()?;
    Some(SacOutcome {
        model,
        mask: vec![true; points0.len()],
        iterations: 0,
    })
}

/// Flag every error not above `threshold_sq`; returns the inlier count.
#[inline]
fn find_inliers(errors: &[Number], threshold_sq: Number, mask: &mut [bool]) -> usize {
    let mut good_count = 0;
    for (flag, err) in mask.iter_mut().zip(errors.iter()) {
        *flag = *err <= threshold_sq;
        if *flag {
            good_count += 1;
        }
    }
    good_count
}

fn median(errors: &[Number]) -> Number {
    let sorted = errors
        .iter()
        .copied()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect_vec();
    let n = sorted.len();
    if n == 0 {
        return Number::MAX;
    }
    if n % 2 != 0 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5
    }
}

/// Iterations needed to draw an outlier-free sample of `model_points` with
/// probability `confidence`, never more than `max_iters`.
pub fn update_num_iters(
    confidence: Number,
    outlier_ratio: Number,
    model_points: usize,
    max_iters: usize,
) -> usize {
    let p = confidence.clamp(0.0, 1.0);
    let ep = outlier_ratio.clamp(0.0, 1.0);

    let num = (1.0 - p).max(Number::MIN_POSITIVE);
    let denom = 1.0 - (1.0 - ep).powi(model_points as i32);
    if denom < Number::MIN_POSITIVE {
        return 0;
    }

    let num = num.ln();
    let denom = denom.ln();
    if denom >= 0.0 || -num >= max_iters as Number * -denom {
        max_iters
    } else {
        (num / denom).round() as usize
    }
}
