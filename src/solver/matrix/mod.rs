mod estimate;
mod fundamental;

pub use estimate::{
    estimate_into, find_fundamental, EstimateParams, EstimationReport, FundamentalEstimate,
    FundamentalSolver, Method,
};
pub use fundamental::{
    compute_correspond_epilines, reprojection_error, reprojection_errors, run_7point,
    run_8point, FundamentalKernel, ImageIndex,
};
