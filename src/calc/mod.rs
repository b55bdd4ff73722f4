use special::Gamma;
use std::f64::consts::PI;
use std::iter::FromIterator;

/// Evaluates log(sum(exp(x))) without overflowing when the entries of x are
/// large log-volumes. Returns negative infinity for an empty slice.
pub fn logsumexp(xs : &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum : f64 = xs.iter().map(|x| (x - max).exp() ).sum();
    max + sum.ln()
}

/// Log-volume of the unit ball in n dimensions: (n/2) log(pi) - log Gamma(n/2 + 1).
pub fn unit_ball_logvol(n : usize) -> f64 {
    let half = 0.5 * n as f64;
    half * PI.ln() - Gamma::ln_gamma(half + 1.).0
}

/// Streaming mean and variance (Welford's recurrence), used to attach
/// a standard error to Monte Carlo averages without holding the draws.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {

    n : usize,

    mean : f64,

    /// Sum of squared deviations from the running mean.
    m2 : f64
}

impl Summary {

    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, x : f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> usize {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance; zero while fewer than two values were seen.
    pub fn var(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            self.m2 / (self.n - 1) as f64
        }
    }

    /// Squared standard error of the mean.
    pub fn var_of_mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.var() / self.n as f64
        }
    }

}

impl Extend<f64> for Summary {

    fn extend<I : IntoIterator<Item=f64>>(&mut self, iter : I) {
        for x in iter {
            self.add(x);
        }
    }

}

impl FromIterator<f64> for Summary {

    fn from_iter<I : IntoIterator<Item=f64>>(iter : I) -> Self {
        let mut s = Summary::new();
        s.extend(iter);
        s
    }

}
