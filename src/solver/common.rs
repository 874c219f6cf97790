use crate::error::FundamentalError;
use crate::num::{Matrix3, Number, Point2, Vector3};

use itertools::Itertools;
use num_traits::Num;

/// Isotropic similarity moving a point set's centroid to the origin and its
/// mean distance from the origin to `sqrt(2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normalization {
    pub centroid: Point2,
    pub scale: Number,
}

impl Normalization {
    /// `T = scale * [I | -centroid]` as a homogeneous 3x3 matrix.
    pub fn matrix(&self) -> Matrix3 {
        let s = self.scale;
        Matrix3::new(
            s,
            0.0,
            -s * self.centroid.x,
            0.0,
            s,
            -s * self.centroid.y,
            0.0,
            0.0,
            1.0,
        )
    }

    #[inline]
    pub fn apply(&self, point: &Point2) -> Point2 {
        Point2::new(
            (point.x - self.centroid.x) * self.scale,
            (point.y - self.centroid.y) * self.scale,
        )
    }
}

/// Compute the normalization of `points` and the normalized copy.
///
/// Fails with [`FundamentalError::DegenerateScale`] when the mean distance to
/// the centroid is below `scale_epsilon` (coincident points) or the set is empty.
pub fn normalize(
    points: &[Point2],
    scale_epsilon: Number,
) -> Result<(Vec<Point2>, Normalization), FundamentalError> {
    if points.is_empty() {
        return Err(FundamentalError::DegenerateScale);
    }
    let num_points = points.len() as Number;

    let centroid = {
        let (sum_x, sum_y) = sum_tuple2(points.iter().map(|p| (p.x, p.y)));
        Point2::new(sum_x / num_points, sum_y / num_points)
    };

    let mean_dist = points
        .iter()
        .map(|p| (*p - centroid).norm())
        .sum::<Number>()
        / num_points;

    // NaN coordinates must not slip through as a valid scale
    if !(mean_dist >= scale_epsilon) {
        return Err(FundamentalError::DegenerateScale);
    }

    let normalization = Normalization {
        centroid,
        scale: std::f64::consts::SQRT_2 / mean_dist,
    };
    let normalized = points.iter().map(|p| normalization.apply(p)).collect_vec();

    Ok((normalized, normalization))
}

/// Keep the entries whose mask flag is set, preserving their order.
pub fn compact<T: Copy>(items: &[T], mask: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(mask.iter())
        .filter(|(_, keep)| **keep)
        .map(|(item, _)| *item)
        .collect()
}

/// Dehomogenize `(x, y, w)` points. A vanishing `w` leaves `(x, y)` unscaled.
pub fn convert_points_homogeneous(points: &[Vector3]) -> Vec<Point2> {
    points
        .iter()
        .map(|p| {
            let w = if p.z.abs() > Number::EPSILON { p.z } else { 1.0 };
            Point2::new(p.x / w, p.y / w)
        })
        .collect()
}

#[inline]
pub fn to_homogeneous(points: &[Point2]) -> Vec<Vector3> {
    points.iter().map(|p| p.to_homogeneous()).collect()
}

#[inline]
fn sum_tuple2<I, N>(iter: I) -> (N, N)
where
    I: Iterator<Item = (N, N)>,
    N: Num,
{
    iter.fold((N::zero(), N::zero()), |(x1, y1), (x2, y2)| {
        (x1 + x2, y1 + y2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalized_points_are_centered_at_sqrt2() {
        let points = vec![
            Point2::new(100.0, 200.0),
            Point2::new(150.0, 250.0),
            Point2::new(120.0, 220.0),
            Point2::new(90.0, 260.0),
        ];
        let (normalized, normalization) = normalize(&points, f32::EPSILON as f64).unwrap();

        let n = normalized.len() as f64;
        let cx = normalized.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = normalized.iter().map(|p| p.y).sum::<f64>() / n;
        let mean_dist = normalized.iter().map(|p| p.coords.norm()).sum::<f64>() / n;

        assert_relative_eq!(cx, 0.0, epsilon = 1e-12);
        assert_relative_eq!(cy, 0.0, epsilon = 1e-12);
        assert_relative_eq!(mean_dist, std::f64::consts::SQRT_2, epsilon = 1e-12);

        // the matrix form agrees with the point-wise transform
        let t = normalization.matrix();
        for (p, q) in points.iter().zip(normalized.iter()) {
            let h = t * p.to_homogeneous();
            assert_relative_eq!(h.x, q.x, epsilon = 1e-12);
            assert_relative_eq!(h.y, q.y, epsilon = 1e-12);
            assert_relative_eq!(h.z, 1.0);
        }
    }

    #[test]
    fn coincident_points_have_no_scale() {
        let points = vec![Point2::new(3.0, -4.0); 10];
        assert_eq!(
            normalize(&points, f32::EPSILON as f64),
            Err(FundamentalError::DegenerateScale)
        );
        assert_eq!(
            normalize(&[], f32::EPSILON as f64),
            Err(FundamentalError::DegenerateScale)
        );
    }

    #[test]
    fn scale_threshold_is_inclusive() {
        // mean distance is exactly 0.5
        let points = vec![Point2::new(-0.5, 0.0), Point2::new(0.5, 0.0)];
        assert!(normalize(&points, 0.5).is_ok());
        assert!(normalize(&points, 0.5 + 1e-9).is_err());
    }

    #[test]
    fn compact_keeps_order() {
        let items = [10, 11, 12, 13, 14, 15];
        let mask = [true, false, false, true, true, false];
        assert_eq!(compact(&items, &mask), vec![10, 13, 14]);
        assert!(compact(&items, &[false; 6]).is_empty());
    }

    #[test]
    fn homogeneous_points_are_dehomogenized() {
        let points = vec![
            Vector3::new(4.0, 6.0, 2.0),
            Vector3::new(-3.0, 9.0, -3.0),
            Vector3::new(7.0, 8.0, 0.0),
        ];
        let cartesian = convert_points_homogeneous(&points);
        assert_eq!(cartesian[0], Point2::new(2.0, 3.0));
        assert_eq!(cartesian[1], Point2::new(1.0, -3.0));
        assert_eq!(cartesian[2], Point2::new(7.0, 8.0));

        let back = to_homogeneous(&cartesian[..1]);
        assert_eq!(back[0], Vector3::new(2.0, 3.0, 1.0));
    }
}
