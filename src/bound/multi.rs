use nalgebra::*;
use super::*;
use crate::calc::{self, Summary};
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Serialize, Deserialize};
use std::convert::TryFrom;
use std::sync::Arc;
use log::{debug, trace};

/// Result of a Monte Carlo estimate of the volume of a union of ellipsoids.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogVolEstimate {

    /// Estimated log-volume of the union.
    pub logvol : f64,

    /// One-sigma uncertainty of logvol due to sampling noise.
    pub logvol_err : f64,

    /// Estimated fraction of the union volume inside the unit cube.
    pub cube_overlap : f64
}

/// Union of ellipsoids of the same dimension. The members are shared, read-only
/// handles: the union neither copies nor changes them, so the same ellipsoid might be
/// part of several unions. Member order only matters for the indices reported back to the user.
///
/// Sampling first picks a member with probability proportional to its volume, then
/// draws uniformly from it. A point in the intersection of q members can be reached through
/// any of them, so it is q times more likely than a point covered by a single member;
/// accepting draws with probability 1/q removes this bias.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MultiEllipsoidParams", into = "MultiEllipsoidParams")]
pub struct MultiEllipsoid {

    ells : Vec<Arc<Ellipsoid>>,

    logvols : Vec<f64>,

    /// Log of the summed member volumes (an upper bound on the union volume).
    logvol_tot : f64,

    /// Picks members proportionally to their volume.
    chooser : WeightedIndex<f64>
}

#[derive(Serialize, Deserialize)]
struct MultiEllipsoidParams {

    members : Vec<Arc<Ellipsoid>>
}

impl TryFrom<MultiEllipsoidParams> for MultiEllipsoid {

    type Error = BoundError;

    fn try_from(params : MultiEllipsoidParams) -> Result<Self, BoundError> {
        MultiEllipsoid::new(params.members)
    }

}

impl From<MultiEllipsoid> for MultiEllipsoidParams {

    fn from(multi : MultiEllipsoid) -> Self {
        MultiEllipsoidParams { members : multi.ells }
    }

}

impl MultiEllipsoid {

    /// Builds the union from owned ellipsoids or shared handles to them. Fails with EmptyUnion
    /// if there are no members, and with DimensionMismatch if the members do not all have
    /// the dimension of the first one.
    pub fn new<I, E>(members : I) -> Result<Self, BoundError>
    where
        I : IntoIterator<Item=E>,
        E : Into<Arc<Ellipsoid>>
    {
        let ells : Vec<Arc<Ellipsoid>> = members.into_iter().map(Into::into).collect();
        let n = ells.first().ok_or(BoundError::EmptyUnion)?.dim();
        for ell in ells.iter() {
            if ell.dim() != n {
                return Err(BoundError::DimensionMismatch { expected : n, found : ell.dim() });
            }
        }
        let logvols : Vec<f64> = ells.iter().map(|e| e.logvol() ).collect();
        let logvol_tot = calc::logsumexp(&logvols);

        // Validated members have finite log-volumes, so the weights are in [0, 1]
        // and the largest one is exactly 1.
        let chooser = WeightedIndex::new(logvols.iter().map(|lv| (lv - logvol_tot).exp() ))
            .expect("Member weights should be finite with a positive total");
        debug!("Union built (members = {}, dim = {}, logvol_tot = {})", ells.len(), n, logvol_tot);
        Ok(Self { ells, logvols, logvol_tot, chooser })
    }

    /// Number of member ellipsoids.
    pub fn len(&self) -> usize {
        self.ells.len()
    }

    pub fn members(&self) -> &[Arc<Ellipsoid>] {
        &self.ells[..]
    }

    pub fn member(&self, ix : usize) -> Option<&Arc<Ellipsoid>> {
        self.ells.get(ix)
    }

    /// Log-volume of each member, in member order.
    pub fn logvols(&self) -> &[f64] {
        &self.logvols[..]
    }

    /// Log of the summed member volumes. Equals the union log-volume only
    /// when no two members overlap.
    pub fn logvol_tot(&self) -> f64 {
        self.logvol_tot
    }

    fn check_dim(&self, found : usize) -> Result<(), BoundError> {
        let n = self.dim();
        if found == n {
            Ok(())
        } else {
            Err(BoundError::DimensionMismatch { expected : n, found })
        }
    }

    /// Indices of all members containing x.
    pub fn within(&self, x : &DVector<f64>) -> Result<Vec<usize>, BoundError> {
        self.check_dim(x.nrows())?;
        Ok(self.ells.iter().enumerate().filter(|(_, e)| e.encloses(x) ).map(|(i, _)| i ).collect())
    }

    /// Union multiplicity of x: the number of members containing it.
    pub fn overlap(&self, x : &DVector<f64>) -> Result<usize, BoundError> {
        self.check_dim(x.nrows())?;
        Ok(self.ells.iter().filter(|e| e.encloses(x) ).count())
    }

    /// Multiplicity of a point drawn from member ix. The drawing member always counts,
    /// even if rounding puts its own draw marginally outside it.
    fn multiplicity(&self, x : &DVector<f64>, ix : usize) -> usize {
        1 + self.ells.iter()
            .enumerate()
            .filter(|(j, e)| *j != ix && e.encloses(x) )
            .count()
    }

    /// Draws a point from a member picked proportionally to its volume, returning the point,
    /// the index of the member it was drawn from, and its multiplicity q (which counts the
    /// drawing member). The draws are not uniform over the union: the caller should
    /// accept each one with probability 1/q.
    pub fn sample_q<R>(&self, rng : &mut R) -> (DVector<f64>, usize, usize)
    where
        R : Rng + ?Sized
    {
        let ix = self.chooser.sample(rng);
        let x = self.ells[ix].sample(rng);
        let q = self.multiplicity(&x, ix);
        (x, ix, q)
    }

    /// Draws a point uniformly from the union, returning it with the index
    /// of the member it was drawn from. Draws from sample_q are repeated until one
    /// passes the 1/q acceptance test.
    pub fn sample<R>(&self, rng : &mut R) -> (DVector<f64>, usize)
    where
        R : Rng + ?Sized
    {
        if self.ells.len() == 1 {
            return (self.ells[0].sample(rng), 0);
        }
        loop {
            let (x, ix, q) = self.sample_q(rng);
            if q == 1 || rng.gen::<f64>() < 1. / q as f64 {
                return (x, ix);
            }
            trace!("Rejected draw from member {} (q = {})", ix, q);
        }
    }

    /// Monte Carlo estimate of the log-volume of the union. Each member i contributes
    /// V_i times the average of 1/q over nsamp points drawn from it; since every volume element
    /// covered by q members is counted by each of them with weight 1/q, the sum is an unbiased
    /// estimate of the union volume. The same draws give the fraction of the union inside
    /// the unit cube.
    ///
    /// Panics if nsamp is zero.
    pub fn monte_carlo_logvol<R>(&self, nsamp : usize, rng : &mut R) -> LogVolEstimate
    where
        R : Rng + ?Sized
    {
        assert!(nsamp > 0, "Volume estimate requires at least one sample per member");

        // Volumes are relative to exp(logvol_tot) until the final log.
        let mut frac = 0f64;
        let mut frac_var = 0f64;
        let mut cube = 0f64;
        for (ix, ell) in self.ells.iter().enumerate() {
            let w = (self.logvols[ix] - self.logvol_tot).exp();
            let mut weights = Summary::new();
            let mut cube_weight = 0f64;
            for _ in 0..nsamp {
                let x = ell.sample(rng);
                let inv_q = 1. / self.multiplicity(&x, ix) as f64;
                weights.add(inv_q);
                if in_unit_cube(x.iter()) {
                    cube_weight += inv_q;
                }
            }
            frac += w * weights.mean();
            frac_var += w.powi(2) * weights.var_of_mean();
            cube += w * cube_weight / nsamp as f64;
        }

        let est = LogVolEstimate {
            logvol : self.logvol_tot + frac.ln(),
            logvol_err : frac_var.sqrt() / frac,
            cube_overlap : cube / frac
        };
        debug!(
            "Union log-volume {} +/- {} (logvol_tot = {}, cube overlap = {})",
            est.logvol,
            est.logvol_err,
            self.logvol_tot,
            est.cube_overlap
        );
        est
    }

    /// Returns the union of the members rescaled to the informed log-volumes
    /// (see Ellipsoid::scale_to_logvol). Fails if logvols does not have one entry per member,
    /// or if any member cannot be rescaled to its target.
    pub fn scale_to_logvols(&self, logvols : &[f64]) -> Result<Self, BoundError> {
        if logvols.len() != self.ells.len() {
            return Err(BoundError::DimensionMismatch { expected : self.ells.len(), found : logvols.len() });
        }
        let scaled = self.ells.iter()
            .zip(logvols.iter())
            .map(|(e, lv)| e.scale_to_logvol(*lv) )
            .collect::<Result<Vec<_>, _>>()?;
        MultiEllipsoid::new(scaled)
    }

    /// End points of the major axis of each member.
    pub fn major_axis_endpoints(&self) -> Vec<(DVector<f64>, DVector<f64>)> {
        self.ells.iter().map(|e| e.major_axis_endpoints() ).collect()
    }

}

impl Region for MultiEllipsoid {

    fn dim(&self) -> usize {
        self.ells[0].dim()
    }

    /// True iff at least one member contains x.
    fn contains(&self, x : &DVector<f64>) -> Result<bool, BoundError> {
        self.check_dim(x.nrows())?;
        Ok(self.ells.iter().any(|e| e.encloses(x) ))
    }

    /// Uniform draw over the union (the member index is discarded).
    fn sample<R>(&self, rng : &mut R) -> DVector<f64>
    where
        R : Rng + ?Sized
    {
        MultiEllipsoid::sample(self, rng).0
    }

}
