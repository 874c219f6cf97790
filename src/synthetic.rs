//! Deterministic two-view scenes with a known fundamental matrix.
//!
//! Two pinhole cameras `K[I|0]` and `K[R|t]` observe random points in front
//! of them; the ground truth is `F = K⁻ᵀ [t]× R K⁻¹`, scaled so `F(3,3) = 1`.
//! Everything is driven by an explicit seed so tests stay reproducible.

use crate::num::{Matrix3, Number, Point2, Vector3};
use crate::solver::reprojection_error;

use nalgebra::Rotation3;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Correspondences exactly consistent with `fundamental`.
#[derive(Clone, Debug)]
pub struct TwoViewScene {
    pub fundamental: Matrix3,
    pub points0: Vec<Point2>,
    pub points1: Vec<Point2>,
    /// `focal` in pixels; the principal point sits at `(0.4, 0.3) · focal`.
    pub focal: Number,
}

impl TwoViewScene {
    /// Project `num_points` random scene points into both views.
    pub fn generate(num_points: usize, focal: Number, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let k = intrinsics(focal);
        let rotation = Rotation3::new(Vector3::new(0.15, -0.25, 0.1)).into_inner();
        let translation = Vector3::new(-1.0, 0.1, 0.2);

        let mut points0 = Vec::with_capacity(num_points);
        let mut points1 = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            let z = rng.gen_range(4.0..8.0);
            let point = Vector3::new(rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5), z);
            let moved = rotation * point + translation;

            points0.push(project(&k, &point));
            points1.push(project(&k, &moved));
        }

        let k_inv = intrinsics_inverse(focal);
        let essential = skew(&translation) * rotation;
        let fundamental = k_inv.transpose() * essential * k_inv;

        Self {
            fundamental: fundamental / fundamental[(2, 2)],
            points0,
            points1,
            focal,
        }
    }

    /// Insert `count` random correspondences whose epipolar error under the
    /// ground truth exceeds `min_error`, at random positions.
    ///
    /// Returns the ground-truth inlier mask of the extended scene.
    pub fn add_outliers(&mut self, count: usize, min_error: Number, seed: u64) -> Vec<bool> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mask = vec![true; self.points0.len()];

        let (cx, cy) = (0.4 * self.focal, 0.3 * self.focal);
        let half = 0.4 * self.focal;

        let mut added = 0;
        while added < count {
            let p0 = Point2::new(
                rng.gen_range(cx - half..cx + half),
                rng.gen_range(cy - half..cy + half),
            );
            let p1 = Point2::new(
                rng.gen_range(cx - half..cx + half),
                rng.gen_range(cy - half..cy + half),
            );
            if reprojection_error(&self.fundamental, &p0, &p1) <= min_error {
                continue;
            }

            let at = rng.gen_range(0..=self.points0.len());
            self.points0.insert(at, p0);
            self.points1.insert(at, p1);
            mask.insert(at, false);
            added += 1;
        }
        mask
    }
}

/// Cross-product matrix: `skew(t) * v == t × v`.
pub fn skew(t: &Vector3) -> Matrix3 {
    Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
}

fn intrinsics(focal: Number) -> Matrix3 {
    Matrix3::new(focal, 0.0, 0.4 * focal, 0.0, focal, 0.3 * focal, 0.0, 0.0, 1.0)
}

fn intrinsics_inverse(focal: Number) -> Matrix3 {
    let inv = 1.0 / focal;
    Matrix3::new(inv, 0.0, -0.4, 0.0, inv, -0.3, 0.0, 0.0, 1.0)
}

#[inline]
fn project(k: &Matrix3, point: &Vector3) -> Point2 {
    let p = k * point;
    Point2::new(p.x / p.z, p.y / p.z)
}
