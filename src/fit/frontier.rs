use nalgebra::*;
use serde::{Serialize, Deserialize};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use thiserror::Error;
use crate::optim::{Bound, ConvexProgram, ConvexSolver, SolverError};
use super::Estimator;

#[derive(Debug, Clone, Error)]
pub enum FrontierError {

    #[error("Invalid market: {0}")]
    InvalidMarket(String),

    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Frontier requires at least one target return")]
    NoTargets,

    #[error("No portfolio could be found for any of the {0} target returns")]
    EmptyFrontier(usize),

    #[error(transparent)]
    Solver(#[from] SolverError)

}

/// Expected returns and return covariances of a set of assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {

    pub names : Vec<String>,

    pub means : DVector<f64>,

    pub cov : DMatrix<f64>

}

fn default_names(n : usize) -> Vec<String> {
    (1..=n).map(|i| format!("C{}", i) ).collect()
}

impl Market {

    pub fn new(names : Vec<String>, means : DVector<f64>, cov : DMatrix<f64>) -> Result<Self, FrontierError> {
        let n = means.nrows();
        if n == 0 {
            return Err(FrontierError::InvalidMarket(String::from("No assets informed")));
        }
        if names.len() != n {
            return Err(FrontierError::InvalidMarket(format!("{} names for {} assets", names.len(), n)));
        }
        if cov.shape() != (n, n) {
            return Err(FrontierError::InvalidMarket(format!(
                "Covariance is {}x{} (expected {}x{})", cov.nrows(), cov.ncols(), n, n
            )));
        }
        if means.iter().chain(cov.iter()).any(|v| !v.is_finite() ) {
            return Err(FrontierError::InvalidMarket(String::from("Non-finite mean or covariance entry")));
        }
        let scale = cov.amax().max(1.);
        if (&cov - cov.transpose()).amax() > 1E-9 * scale {
            return Err(FrontierError::InvalidMarket(String::from("Covariance is not symmetric")));
        }
        let min_eigen = cov.clone().symmetric_eigenvalues().min();
        if min_eigen < -1E-9 * scale {
            return Err(FrontierError::InvalidMarket(format!(
                "Covariance is not positive semi-definite (eigenvalue {:e})", min_eigen
            )));
        }
        Ok(Self { names, means, cov })
    }

    /// Market with default names C1..Cn.
    pub fn unnamed(means : DVector<f64>, cov : DMatrix<f64>) -> Result<Self, FrontierError> {
        Self::new(default_names(means.nrows()), means, cov)
    }

    /// Random market: expected returns uniform over mean_range and covariance A A^T,
    /// with A an n x n standard normal matrix (positive semi-definite by construction).
    pub fn synthetic(n_assets : usize, mean_range : (f64, f64), seed : u64) -> Result<Self, FrontierError> {
        let (lo, hi) = mean_range;
        if n_assets == 0 || !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(FrontierError::InvalidMarket(format!(
                "Cannot draw {} assets with returns in [{}, {}]", n_assets, lo, hi
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let unif = Uniform::new(lo, hi);
        let means = DVector::from_fn(n_assets, |_, _| unif.sample(&mut rng) );
        let a = DMatrix::from_fn(n_assets, n_assets, |_, _| {
            let z : f64 = StandardNormal.sample(&mut rng);
            z
        });
        let cov = &a * a.transpose();
        Self::unnamed(means, cov)
    }

    /// Estimates the market from a (periods x assets) table of observed returns,
    /// using the sample mean and the unbiased sample covariance of each column.
    pub fn from_returns(names : Vec<String>, returns : &DMatrix<f64>) -> Result<Self, FrontierError> {
        let n = returns.nrows();
        if n < 2 {
            return Err(FrontierError::InvalidMarket(format!(
                "At least two periods are required to estimate covariances ({} informed)", n
            )));
        }
        let means : DVector<f64> = returns.row_mean().transpose();
        let centered = DMatrix::from_fn(n, returns.ncols(), |i, j| returns[(i, j)] - means[j] );
        let cov = (centered.transpose() * &centered) / (n - 1) as f64;
        Self::new(names, means, cov)
    }

    pub fn n_assets(&self) -> usize {
        self.means.nrows()
    }

    /// Objective value 0.5 w^T C w.
    pub fn risk(&self, w : &DVector<f64>) -> f64 {
        0.5 * w.dot(&(&self.cov * w))
    }

    pub fn expected_return(&self, w : &DVector<f64>) -> f64 {
        self.means.dot(w)
    }

    pub fn portfolio(&self, weights : DVector<f64>) -> Portfolio {
        let risk = self.risk(&weights);
        let expected_return = self.expected_return(&weights);
        Portfolio { weights, risk, expected_return }
    }

    /// Smallest and largest expected return over single assets.
    pub fn return_range(&self) -> (f64, f64) {
        (self.means.min(), self.means.max())
    }

}

/// Fully-invested, long-only allocation over the assets of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {

    pub weights : DVector<f64>,

    pub risk : f64,

    pub expected_return : f64

}

impl Portfolio {

    /// Standard deviation of the portfolio return, sqrt(w^T C w).
    pub fn volatility(&self) -> f64 {
        (2. * self.risk).max(0.).sqrt()
    }

}

/// Builds the quadratic program
///
/// minimize     0.5 w^T C w
/// subject to   sum(w) = 1
///              m^T w = target  (if informed)
///              0 <= w_i <= 1
pub fn formulate(market : &Market, target : Option<f64>) -> ConvexProgram {
    let n = market.n_assets();
    let n_eq = if target.is_some() { 2 } else { 1 };
    let mut a_eq = DMatrix::zeros(n_eq, n);
    let mut b_eq = DVector::zeros(n_eq);
    a_eq.row_mut(0).fill(1.);
    b_eq[0] = 1.;
    if let Some(r) = target {
        a_eq.row_mut(1).copy_from(&market.means.transpose());
        b_eq[1] = r;
    }
    ConvexProgram::minimize(DVector::zeros(n))
        .with_quadratic(market.cov.clone())
        .with_equalities(a_eq, b_eq)
        .with_bounds(vec![Bound::between(0., 1.); n])
}

/// Minimum-risk portfolio, reaching the target expected return if one is informed.
/// Without a target, this is the global minimum-variance portfolio.
pub fn min_variance(
    market : &Market,
    target : Option<f64>,
    solver : &dyn ConvexSolver
) -> Result<Portfolio, FrontierError> {
    let sol = solver.solve(&formulate(market, target))?;
    Ok(market.portfolio(sol.x))
}

/// n evenly-spaced target returns, from the smallest to the largest single-asset return.
pub fn target_grid(market : &Market, n : usize) -> Result<Vec<f64>, FrontierError> {
    let (lo, hi) = market.return_range();
    match n {
        0 => Err(FrontierError::NoTargets),
        1 => Ok(vec![lo]),
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            Ok((0..n).map(|i| if i == n - 1 { hi } else { lo + step * i as f64 } ).collect())
        }
    }
}

/// Minimum-risk portfolios over a grid of target returns, by ascending target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frontier {

    pub portfolios : Vec<Portfolio>,

    /// Targets for which no portfolio was found.
    pub skipped : Vec<f64>

}

/// Traces the efficient frontier over n_targets target returns. Targets whose
/// program fails are skipped; the call only fails if every target fails.
pub fn efficient_frontier(
    market : &Market,
    n_targets : usize,
    solver : &dyn ConvexSolver
) -> Result<Frontier, FrontierError> {
    efficient_frontier_with(market, n_targets, solver, |_, _, _| { })
}

/// Same as efficient_frontier, calling on_step(index, target, result) after each
/// target is solved.
pub fn efficient_frontier_with<F>(
    market : &Market,
    n_targets : usize,
    solver : &dyn ConvexSolver,
    mut on_step : F
) -> Result<Frontier, FrontierError>
where
    F : FnMut(usize, f64, Option<&Portfolio>)
{
    let targets = target_grid(market, n_targets)?;
    let mut portfolios = Vec::with_capacity(targets.len());
    let mut skipped = Vec::new();
    for (i, target) in targets.iter().enumerate() {
        match min_variance(market, Some(*target), solver) {
            Ok(port) => {
                on_step(i, *target, Some(&port));
                portfolios.push(port);
            },
            Err(e) => {
                warn!("Skipping target return {}: {}", target, e);
                on_step(i, *target, None);
                skipped.push(*target);
            }
        }
    }
    if portfolios.is_empty() {
        return Err(FrontierError::EmptyFrontier(targets.len()));
    }
    debug!("Frontier has {} portfolios ({} targets skipped)", portfolios.len(), skipped.len());
    Ok(Frontier { portfolios, skipped })
}

/// Monte Carlo cloud of long-only portfolios: weights drawn uniformly over [0, 1)
/// and normalized to sum to one.
pub fn random_portfolios(market : &Market, count : usize, seed : u64) -> Vec<Portfolio> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = market.n_assets();
    let mut ports = Vec::with_capacity(count);
    while ports.len() < count {
        let w = DVector::from_fn(n, |_, _| rng.gen::<f64>() );
        let total = w.sum();
        if total > 0. {
            ports.push(market.portfolio(w / total));
        }
    }
    ports
}

/// Settings of a frontier sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {

    pub targets : usize

}

impl Estimator<Market> for Frontier {

    type Settings = SweepSettings;

    type Error = FrontierError;

    fn estimate(
        sample : &Market,
        settings : &SweepSettings,
        solver : &dyn ConvexSolver
    ) -> Result<Self, FrontierError> {
        efficient_frontier(sample, settings.targets, solver)
    }

}

/// Labeled asset weights, as shown in an allocation chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {

    pub labels : Vec<String>,

    pub weights : Vec<f64>,

    pub risk : Option<f64>

}

impl Allocation {

    /// Validates a literal allocation. Missing labels default to C1..Cn.
    pub fn new(labels : Option<Vec<String>>, weights : Vec<f64>, risk : Option<f64>) -> Result<Self, FrontierError> {
        if weights.is_empty() {
            return Err(FrontierError::InvalidAllocation(String::from("No weights informed")));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0. ) {
            return Err(FrontierError::InvalidAllocation(String::from("Weights must be finite and non-negative")));
        }
        if weights.iter().sum::<f64>() <= 0. {
            return Err(FrontierError::InvalidAllocation(String::from("Weights sum to zero")));
        }
        let labels = labels.unwrap_or_else(|| default_names(weights.len()) );
        if labels.len() != weights.len() {
            return Err(FrontierError::InvalidAllocation(format!(
                "{} labels for {} weights", labels.len(), weights.len()
            )));
        }
        Ok(Self { labels, weights, risk })
    }

    pub fn from_portfolio(market : &Market, port : &Portfolio) -> Self {
        // Interior-point solutions may carry tiny negative weights.
        let weights = port.weights.iter().map(|w| w.max(0.) ).collect();
        Self { labels : market.names.clone(), weights, risk : Some(port.risk) }
    }

    /// Percentage of the weight total held at each asset.
    pub fn shares(&self) -> Vec<f64> {
        let total : f64 = self.weights.iter().sum();
        self.weights.iter().map(|w| 100. * w / total ).collect()
    }

}

#[test]
fn target_grid_spacing() {
    let market = Market::unnamed(
        DVector::from_vec(vec![0.1, 0.3, 0.2]),
        DMatrix::identity(3, 3)
    ).unwrap();
    let grid = target_grid(&market, 3).unwrap();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.1).abs() < 1E-12);
    assert!((grid[1] - 0.2).abs() < 1E-12);
    assert_eq!(grid[2], 0.3);
    assert_eq!(target_grid(&market, 1).unwrap(), vec![0.1]);
    assert!(matches!(target_grid(&market, 0), Err(FrontierError::NoTargets)));
}

#[test]
fn returns_estimation() {
    let returns = DMatrix::from_row_slice(3, 2, &[
        1., 2.,
        2., 4.,
        3., 0.
    ]);
    let market = Market::from_returns(vec!["A".into(), "B".into()], &returns).unwrap();
    assert_eq!(market.means, DVector::from_vec(vec![2., 2.]));
    // var(A) = 1, var(B) = 4, cov(A, B) = (-1*0 + 0*2 + 1*-2) / 2 = -1
    assert_eq!(market.cov, DMatrix::from_row_slice(2, 2, &[1., -1., -1., 4.]));
}

#[test]
fn market_validation() {
    let asym = DMatrix::from_row_slice(2, 2, &[1., 0.5, 0., 1.]);
    assert!(Market::unnamed(DVector::from_vec(vec![0.1, 0.2]), asym).is_err());
    assert!(Market::unnamed(DVector::zeros(0), DMatrix::zeros(0, 0)).is_err());
    let synth = Market::synthetic(5, (0.05, 0.20), 42).unwrap();
    assert_eq!(synth.names[4], "C5");
    assert!(synth.means.iter().all(|m| *m >= 0.05 && *m < 0.20 ));
    assert_eq!(synth, Market::synthetic(5, (0.05, 0.20), 42).unwrap());
}

#[test]
fn indefinite_covariance_is_rejected() {
    let indef = DMatrix::from_row_slice(2, 2, &[1., 0., 0., -1.]);
    let res = Market::unnamed(DVector::from_vec(vec![0.1, 0.2]), indef);
    assert!(matches!(res, Err(FrontierError::InvalidMarket(_))));

    // Singular but positive semi-definite covariances are still valid markets.
    let singular = DMatrix::from_row_slice(2, 2, &[1., 1., 1., 1.]);
    assert!(Market::unnamed(DVector::from_vec(vec![0.1, 0.2]), singular).is_ok());
}

#[test]
fn allocation_shares() {
    let alloc = Allocation::new(None, vec![1., 3.], Some(0.1)).unwrap();
    assert_eq!(alloc.labels, vec!["C1".to_string(), "C2".to_string()]);
    assert_eq!(alloc.shares(), vec![25., 75.]);
    assert!(Allocation::new(None, vec![-1., 2.], None).is_err());
    assert!(Allocation::new(Some(vec!["A".into()]), vec![1., 2.], None).is_err());
}
