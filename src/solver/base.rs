use crate::num::{Number, Point2};

pub trait Solver<R>: Send + Sync
where
    R: Send + Sync,
{
    const MAX_ITER: usize = 0;

    fn solve(self, repeat: usize) -> R;

    #[inline]
    fn solve_to_end(self) -> R
    where
        Self: Sized,
    {
        self.solve(Self::MAX_ITER)
    }
}

/// A solver producing model candidates from a minimal set of correspondences.
pub trait MinimalSampleKernel {
    type Model: Clone;

    /// Number of correspondences in a minimal sample.
    const SAMPLE_SIZE: usize;

    /// Compute every candidate model consistent with the sample.
    ///
    /// Numeric degeneracies yield an empty list.
    fn solve(&self, points0: &[Point2], points1: &[Point2]) -> Vec<Self::Model>;

    /// Reject samples that cannot produce a meaningful model.
    #[inline]
    fn is_degenerate_sample(&self, _points0: &[Point2], _points1: &[Point2]) -> bool {
        false
    }
}

/// Scores a model against every correspondence.
pub trait ErrorMetric<M> {
    /// Fill `errors` with one non-negative value per correspondence.
    fn errors(&self, model: &M, points0: &[Point2], points1: &[Point2], errors: &mut Vec<Number>);
}
