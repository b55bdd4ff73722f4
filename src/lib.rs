/// Bounding regions for nested sampling: single ellipsoids and unions of ellipsoids,
/// with containment tests, uniform sampling from the region interior and (Monte Carlo)
/// volume estimates. Every stochastic operation receives its random source explicitly.
pub mod bound;

/// Numeric helpers shared by the bounds (log-sum-exp, unit-ball volumes and
/// streaming summaries of Monte Carlo weights).
pub mod calc;

pub use bound::{BoundError, Ellipsoid, LogVolEstimate, MultiEllipsoid, Region};
