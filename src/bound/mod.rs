use nalgebra::*;
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

/// Single ellipsoid defined by a center and a positive-definite shape matrix.
pub mod ellipsoid;

pub use ellipsoid::*;

/// Union of (possibly overlapping) ellipsoids.
pub mod multi;

pub use multi::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundError {

    /// Carries the offending eigenvalue (or radius).
    #[error("Shape matrix is not positive-definite (eigenvalue {0})")]
    SingularShape(f64),

    #[error("Shape matrix is not symmetric")]
    AsymmetricShape,

    #[error("Center or shape matrix has non-finite entries")]
    NonFinite,

    #[error("Union of ellipsoids requires at least one member")]
    EmptyUnion,

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected : usize, found : usize }

}

/// Trait shared by structures that represent a bounded region on the n-dimensional real
/// vector space, from which new points can be proposed uniformly. Implemented by a single
/// ellipsoid (symmetric positive-definite shape matrix and a center) and by unions
/// of ellipsoids. All stochastic methods take the random source explicitly, so that
/// a fixed seed reproduces the same sequence of draws and independent sources can be
/// used from independent threads.
pub trait Region {

    /// Dimensionality of the space the region lives in.
    fn dim(&self) -> usize;

    /// Whether x lies in the (closed) region. Fails if x does not have dim() entries.
    fn contains(&self, x : &DVector<f64>) -> Result<bool, BoundError>;

    /// Draws a single point uniformly from the region interior.
    fn sample<R>(&self, rng : &mut R) -> DVector<f64>
    where
        R : Rng + ?Sized;

    /// Draws n points, arranged over the rows of the output matrix.
    fn samples<R>(&self, n : usize, rng : &mut R) -> DMatrix<f64>
    where
        R : Rng + ?Sized
    {
        let mut out = DMatrix::zeros(n, self.dim());
        for i in 0..n {
            let x = self.sample(rng);
            out.row_mut(i).copy_from(&x.transpose());
        }
        out
    }

    /// Monte Carlo estimate of the fraction of the region volume inside the
    /// closed unit hypercube [0,1]^d. The standard error of the estimate is
    /// sqrt(f(1-f)/nsamp).
    fn unitcube_overlap<R>(&self, nsamp : usize, rng : &mut R) -> f64
    where
        R : Rng + ?Sized
    {
        assert!(nsamp > 0, "Overlap estimate requires at least one sample");
        let draws = self.samples(nsamp, rng);
        let inside = draws.row_iter().filter(|row| in_unit_cube(row.iter()) ).count();
        inside as f64 / nsamp as f64
    }

}

/// Whether all coordinates are within [0, 1].
pub fn in_unit_cube<'a, I>(x : I) -> bool
where
    I : IntoIterator<Item=&'a f64>
{
    x.into_iter().all(|v| *v >= 0. && *v <= 1. )
}

/// Draws a point uniformly from the interior of the n-dimensional unit ball.
/// The direction is a normalized standard normal vector; the radius u^(1/n)
/// makes the density uniform in volume rather than in radius.
pub fn sample_unit_ball<R>(n : usize, rng : &mut R) -> DVector<f64>
where
    R : Rng + ?Sized
{
    let (mut z, norm) = loop {
        let z = DVector::from_fn(n, |_, _| rng.sample::<f64, _>(StandardNormal) );
        let norm = z.norm();
        if norm > 0. {
            break (z, norm);
        }
    };
    let r = rng.gen::<f64>().powf(1. / n as f64);
    z *= r / norm;
    z
}
