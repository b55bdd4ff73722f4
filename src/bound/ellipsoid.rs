use nalgebra::*;
use super::*;
use crate::calc;
use serde::{Serialize, Deserialize};
use std::convert::TryFrom;
use log::debug;

/// Symmetric entries closer than this (relative to the largest entry) are taken as equal.
const SYMMETRY_TOL : f64 = 1E-8;

/// Fitted covariances whose smallest eigenvalue is below this fraction of the largest are flat.
const FLAT_TOL : f64 = 1E-12;

/// Ellipsoid parametrized by a center c (px1) and a positive-definite shape matrix A (pxp),
/// holding the points x with (x - c)^T A^{-1} (x - c) <= 1. The shape matrix plays the
/// role of a covariance: its eigenvectors give the principal directions and the square roots
/// of its eigenvalues the semi-axis lengths.
///
/// The precision matrix, the principal axes and the log-volume are computed once at
/// construction. An ellipsoid never changes after it is built; operations that would change it
/// (such as scale_to_logvol) return a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EllipsoidParams", into = "EllipsoidParams")]
pub struct Ellipsoid {

    n : usize,

    center : DVector<f64>,

    shape : DMatrix<f64>,

    /// Inverse of the shape matrix, against which containment is evaluated.
    prec : DMatrix<f64>,

    /// Principal semi-axes over columns (eigenvectors scaled by the square root of the
    /// eigenvalues). Maps the unit ball into the centered ellipsoid.
    axes : DMatrix<f64>,

    axlens : DVector<f64>,

    logdet : f64,

    logvol : f64
}

/// Defining data of an ellipsoid. Derived quantities are never serialized,
/// and deserialization goes through Ellipsoid::new.
#[derive(Serialize, Deserialize)]
struct EllipsoidParams {

    center : DVector<f64>,

    shape : DMatrix<f64>
}

impl TryFrom<EllipsoidParams> for Ellipsoid {

    type Error = BoundError;

    fn try_from(params : EllipsoidParams) -> Result<Self, BoundError> {
        Ellipsoid::new(params.center, params.shape)
    }

}

impl From<Ellipsoid> for EllipsoidParams {

    fn from(ell : Ellipsoid) -> Self {
        EllipsoidParams { center : ell.center, shape : ell.shape }
    }

}

fn check_symmetric(shape : &DMatrix<f64>) -> Result<(), BoundError> {
    let scale = shape.iter().fold(0.0f64, |m, a| m.max(a.abs()) );
    let tol = SYMMETRY_TOL * scale;
    for i in 0..shape.nrows() {
        for j in (i + 1)..shape.ncols() {
            if (shape[(i, j)] - shape[(j, i)]).abs() > tol {
                return Err(BoundError::AsymmetricShape);
            }
        }
    }
    Ok(())
}

impl Ellipsoid {

    /// Builds the ellipsoid {x : (x - center)^T shape^{-1} (x - center) <= 1}.
    ///
    /// Fails with DimensionMismatch if shape is not square with as many rows as center has
    /// entries (zero-dimensional ellipsoids are rejected the same way); with AsymmetricShape
    /// if shape is not symmetric; with NonFinite if any entry is NaN or infinite; and with
    /// SingularShape if shape has a zero or negative eigenvalue, or cannot be Cholesky-factored.
    pub fn new(center : DVector<f64>, shape : DMatrix<f64>) -> Result<Self, BoundError> {
        let n = center.nrows();
        if n == 0 {
            return Err(BoundError::DimensionMismatch { expected : 1, found : 0 });
        }
        if shape.nrows() != n {
            return Err(BoundError::DimensionMismatch { expected : n, found : shape.nrows() });
        }
        if shape.ncols() != n {
            return Err(BoundError::DimensionMismatch { expected : n, found : shape.ncols() });
        }
        if !center.iter().chain(shape.iter()).all(|a| a.is_finite() ) {
            return Err(BoundError::NonFinite);
        }
        check_symmetric(&shape)?;

        // Discard the rounding-level asymmetry the check above lets through.
        let shape = (&shape + shape.transpose()) * 0.5;
        let eigen = SymmetricEigen::new(shape.clone());
        let eigvals = eigen.eigenvalues;
        let eigvecs = eigen.eigenvectors;
        let min_eig = eigvals.iter().cloned().fold(f64::INFINITY, f64::min);

        // The factorization fails at the first pivot that is zero or negative.
        if Cholesky::new(shape.clone()).is_none() || !(min_eig > 0.) || !min_eig.is_finite() {
            return Err(BoundError::SingularShape(min_eig));
        }

        let axlens = eigvals.map(f64::sqrt);
        let axes = &eigvecs * DMatrix::from_diagonal(&axlens);
        let prec = &eigvecs * DMatrix::from_diagonal(&eigvals.map(|l| 1. / l )) * eigvecs.transpose();
        if !prec.iter().all(|a| a.is_finite() ) {
            return Err(BoundError::SingularShape(min_eig));
        }
        let logdet : f64 = eigvals.iter().map(|l| l.ln() ).sum();
        let logvol = calc::unit_ball_logvol(n) + 0.5 * logdet;
        debug!("Ellipsoid built (dim = {}, logvol = {})", n, logvol);
        Ok(Self { n, center, shape, prec, axes, axlens, logdet, logvol })
    }

    /// Ball of the informed radius around center.
    pub fn sphere(center : DVector<f64>, radius : f64) -> Result<Self, BoundError> {
        if !(radius > 0.) {
            return Err(BoundError::SingularShape(radius));
        }
        let n = center.nrows();
        Self::new(center, DMatrix::identity(n, n) * radius.powi(2))
    }

    /// Builds the ellipsoid with the shape of the sample covariance of points (arranged
    /// over rows), centered at their mean and scaled so that every point lies inside it.
    /// The result is then inflated so that its volume is enlarge times that minimal volume.
    /// Requires at least p + 1 points that are not confined to a hyperplane, failing with
    /// SingularShape otherwise.
    pub fn bounding(points : &DMatrix<f64>, enlarge : f64) -> Result<Self, BoundError> {
        assert!(enlarge >= 1., "Enlargement factor should be at least one");
        let (npts, n) = points.shape();
        if n == 0 {
            return Err(BoundError::DimensionMismatch { expected : 1, found : 0 });
        }
        if npts < n + 1 {
            return Err(BoundError::SingularShape(0.));
        }

        let mut mean = DVector::zeros(n);
        for row in points.row_iter() {
            mean += row.transpose();
        }
        mean /= npts as f64;

        let mut cov = DMatrix::zeros(n, n);
        for row in points.row_iter() {
            let d = row.transpose() - &mean;
            cov += &d * d.transpose();
        }
        cov /= (npts - 1) as f64;

        // Points on a hyperplane leave a covariance that is singular up to rounding.
        let eigvals = SymmetricEigen::new(cov.clone()).eigenvalues;
        let min_eig = eigvals.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_eig = eigvals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !(min_eig > max_eig * FLAT_TOL) {
            return Err(BoundError::SingularShape(min_eig));
        }

        let ell = Ellipsoid::new(mean, cov)?;
        let dmax = ell.distance_many(points)?.iter().cloned().fold(0.0f64, f64::max);

        // Keep the farthest point strictly inside under rounding.
        let fmax = dmax.powi(2) * (1. + 1E-10);
        let logvol = ell.logvol + 0.5 * n as f64 * fmax.ln() + enlarge.ln();
        ell.scale_to_logvol(logvol)
    }

    pub fn center(&self) -> &DVector<f64> {
        &self.center
    }

    pub fn shape(&self) -> &DMatrix<f64> {
        &self.shape
    }

    /// Inverse of the shape matrix.
    pub fn precision(&self) -> &DMatrix<f64> {
        &self.prec
    }

    /// Principal semi-axes, one per column.
    pub fn axes(&self) -> &DMatrix<f64> {
        &self.axes
    }

    pub fn axis_lengths(&self) -> &DVector<f64> {
        &self.axlens
    }

    /// Natural log of the determinant of the shape matrix.
    pub fn logdet(&self) -> f64 {
        self.logdet
    }

    /// Log of the ellipsoid volume: log-volume of the unit n-ball plus half the
    /// log-determinant of the shape matrix.
    pub fn logvol(&self) -> f64 {
        self.logvol
    }

    /// Ellipsoid volume. Might overflow or underflow in high dimensions,
    /// where logvol should be preferred.
    pub fn vol(&self) -> f64 {
        self.logvol.exp()
    }

    fn check_dim(&self, found : usize) -> Result<(), BoundError> {
        if found == self.n {
            Ok(())
        } else {
            Err(BoundError::DimensionMismatch { expected : self.n, found })
        }
    }

    fn mahalanobis_sq(&self, x : &DVector<f64>) -> f64 {
        let d = x - &self.center;
        d.dot(&(&self.prec * &d))
    }

    /// Containment for points already known to have the right dimension.
    pub(crate) fn encloses(&self, x : &DVector<f64>) -> bool {
        self.mahalanobis_sq(x) <= 1.
    }

    /// Mahalanobis distance of x from the center; the ellipsoid boundary is at distance one.
    pub fn distance(&self, x : &DVector<f64>) -> Result<f64, BoundError> {
        self.check_dim(x.nrows())?;
        Ok(self.mahalanobis_sq(x).sqrt())
    }

    /// Mahalanobis distances of each row of points.
    pub fn distance_many(&self, points : &DMatrix<f64>) -> Result<DVector<f64>, BoundError> {
        self.check_dim(points.ncols())?;
        let dists = points.row_iter().map(|row| self.mahalanobis_sq(&row.transpose()).sqrt() );
        Ok(DVector::from_iterator(points.nrows(), dists))
    }

    /// Returns an ellipsoid with the same center and orientation,
    /// with all axes scaled by the same factor so that its log-volume equals logvol.
    /// Fails with NonFinite if logvol is not finite or the rescaled matrices overflow, and
    /// with SingularShape if the scale factor or any axis underflows to zero.
    pub fn scale_to_logvol(&self, logvol : f64) -> Result<Self, BoundError> {
        if !logvol.is_finite() {
            return Err(BoundError::NonFinite);
        }
        let f = ((logvol - self.logvol) * 2. / self.n as f64).exp();
        if !f.is_finite() {
            return Err(BoundError::NonFinite);
        }
        if !f.is_normal() {
            return Err(BoundError::SingularShape(f));
        }
        let sqrt_f = f.sqrt();
        let scaled = Self {
            n : self.n,
            center : self.center.clone(),
            shape : &self.shape * f,
            prec : &self.prec / f,
            axes : &self.axes * sqrt_f,
            axlens : &self.axlens * sqrt_f,
            logdet : self.logdet + self.n as f64 * f.ln(),
            logvol
        };
        let min_len = scaled.axlens.iter().cloned().fold(f64::INFINITY, f64::min);
        if !(min_len > 0.) {
            return Err(BoundError::SingularShape(min_len));
        }
        let finite = scaled.shape.iter()
            .chain(scaled.prec.iter())
            .chain(scaled.axes.iter())
            .all(|a| a.is_finite() );
        if !finite {
            return Err(BoundError::NonFinite);
        }
        Ok(scaled)
    }

    /// The two points at the ends of the longest principal axis.
    pub fn major_axis_endpoints(&self) -> (DVector<f64>, DVector<f64>) {
        let (imax, _) = self.axlens.iter().enumerate()
            .fold((0, f64::NEG_INFINITY), |(im, lm), (i, l)| if *l > lm { (i, *l) } else { (im, lm) } );
        let axis = self.axes.column(imax);
        (&self.center - &axis, &self.center + &axis)
    }

}

impl Region for Ellipsoid {

    fn dim(&self) -> usize {
        self.n
    }

    /// True iff the Mahalanobis distance of x from the center is at most one.
    fn contains(&self, x : &DVector<f64>) -> Result<bool, BoundError> {
        self.check_dim(x.nrows())?;
        Ok(self.encloses(x))
    }

    /// Maps a uniform draw from the unit ball through the principal axes
    /// and offsets it by the center, which preserves uniformity by volume.
    fn sample<R>(&self, rng : &mut R) -> DVector<f64>
    where
        R : Rng + ?Sized
    {
        let u = sample_unit_ball(self.n, rng);
        &self.axes * u + &self.center
    }

}
