use nalgebra::*;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Interior-point backend, via the Clarabel conic solver.
pub mod conic;

pub use conic::*;

#[derive(Debug, Clone, Error)]
pub enum SolverError {

    #[error("Problem is infeasible ({0})")]
    Infeasible(String),

    #[error("Problem is unbounded ({0})")]
    Unbounded(String),

    #[error("Solver did not converge ({0})")]
    NotConverged(String),

    #[error("Invalid problem dimensions: {0}")]
    Dimension(String),

    #[error("Invalid solver settings: {0}")]
    Settings(String)

}

/// Lower and upper limits of a single decision variable. None means unlimited
/// in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {

    pub lower : Option<f64>,

    pub upper : Option<f64>

}

impl Bound {

    pub fn free() -> Self {
        Self { lower : None, upper : None }
    }

    pub fn nonnegative() -> Self {
        Self { lower : Some(0.), upper : None }
    }

    pub fn between(lower : f64, upper : f64) -> Self {
        Self { lower : Some(lower), upper : Some(upper) }
    }

    /// [-radius, radius] if a radius is informed; unlimited otherwise.
    pub fn symmetric(radius : Option<f64>) -> Self {
        match radius {
            Some(r) => Self::between(-r, r),
            None => Self::free()
        }
    }

    pub fn contains(&self, v : f64, tol : f64) -> bool {
        self.lower.map(|l| v >= l - tol ).unwrap_or(true) &&
            self.upper.map(|u| v <= u + tol ).unwrap_or(true)
    }

}

impl Default for Bound {

    fn default() -> Self {
        Self::free()
    }

}

/// A convex program over n variables:
///
/// minimize     0.5 x^T Q x + c^T x
/// subject to   A_ub x <= b_ub
///              A_eq x  = b_eq
///              l <= x <= u
///
/// A linear program is the special case without quadratic term. Q is expected
/// to be symmetric positive semi-definite.
#[derive(Debug, Clone)]
pub struct ConvexProgram {

    pub cost : DVector<f64>,

    pub quadratic : Option<DMatrix<f64>>,

    pub a_ub : DMatrix<f64>,

    pub b_ub : DVector<f64>,

    pub a_eq : DMatrix<f64>,

    pub b_eq : DVector<f64>,

    pub bounds : Vec<Bound>

}

impl ConvexProgram {

    /// Starts a program minimizing c^T x, without constraints and with free variables.
    pub fn minimize(cost : DVector<f64>) -> Self {
        let n = cost.nrows();
        Self {
            cost,
            quadratic : None,
            a_ub : DMatrix::zeros(0, n),
            b_ub : DVector::zeros(0),
            a_eq : DMatrix::zeros(0, n),
            b_eq : DVector::zeros(0),
            bounds : vec![Bound::free(); n]
        }
    }

    pub fn with_quadratic(mut self, q : DMatrix<f64>) -> Self {
        self.quadratic = Some(q);
        self
    }

    pub fn with_inequalities(mut self, a_ub : DMatrix<f64>, b_ub : DVector<f64>) -> Self {
        self.a_ub = a_ub;
        self.b_ub = b_ub;
        self
    }

    pub fn with_equalities(mut self, a_eq : DMatrix<f64>, b_eq : DVector<f64>) -> Self {
        self.a_eq = a_eq;
        self.b_eq = b_eq;
        self
    }

    pub fn with_bounds(mut self, bounds : Vec<Bound>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn nvars(&self) -> usize {
        self.cost.nrows()
    }

    /// Value of the objective at x.
    pub fn objective(&self, x : &DVector<f64>) -> f64 {
        let lin = self.cost.dot(x);
        match &self.quadratic {
            Some(q) => 0.5 * x.dot(&(q * x)) + lin,
            None => lin
        }
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        let n = self.nvars();
        if n == 0 {
            return Err(SolverError::Dimension(String::from("Program has no variables")));
        }
        if let Some(q) = &self.quadratic {
            if q.shape() != (n, n) {
                return Err(SolverError::Dimension(format!(
                    "Quadratic term is {}x{} (expected {}x{})", q.nrows(), q.ncols(), n, n
                )));
            }
        }
        if self.a_ub.ncols() != n || self.a_ub.nrows() != self.b_ub.nrows() {
            return Err(SolverError::Dimension(format!(
                "Inequality system is {}x{} with {} bounds (expected {} columns)",
                self.a_ub.nrows(), self.a_ub.ncols(), self.b_ub.nrows(), n
            )));
        }
        if self.a_eq.ncols() != n || self.a_eq.nrows() != self.b_eq.nrows() {
            return Err(SolverError::Dimension(format!(
                "Equality system is {}x{} with {} values (expected {} columns)",
                self.a_eq.nrows(), self.a_eq.ncols(), self.b_eq.nrows(), n
            )));
        }
        if self.bounds.len() != n {
            return Err(SolverError::Dimension(format!(
                "{} variable bounds informed for {} variables", self.bounds.len(), n
            )));
        }
        for (i, b) in self.bounds.iter().enumerate() {
            if let (Some(l), Some(u)) = (b.lower, b.upper) {
                if l > u {
                    return Err(SolverError::Dimension(format!("Empty bound [{}, {}] for variable {}", l, u, i)));
                }
            }
        }
        Ok(())
    }

}

/// Optimal point returned by a solver.
#[derive(Debug, Clone)]
pub struct Solution {

    pub x : DVector<f64>,

    pub objective : f64,

    pub iterations : u32

}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {

    /// Absolute/relative duality gap and feasibility tolerance.
    pub tolerance : f64,

    pub max_iter : u32,

    /// Prints the solver iteration log to stdout.
    pub verbose : bool

}

impl Default for SolverSettings {

    fn default() -> Self {
        Self { tolerance : 1E-8, max_iter : 200, verbose : false }
    }

}

/// Anything able to solve a ConvexProgram to optimality. Implementors report infeasible
/// and unbounded programs as errors carrying the backend diagnostic.
pub trait ConvexSolver {

    fn solve(&self, prog : &ConvexProgram) -> Result<Solution, SolverError>;

}

#[test]
fn program_validation() {
    let prog = ConvexProgram::minimize(DVector::from_vec(vec![1., 1.]))
        .with_inequalities(DMatrix::from_row_slice(1, 3, &[1., 1., 1.]), DVector::from_vec(vec![1.]));
    assert!(matches!(prog.validate(), Err(SolverError::Dimension(_))));
    let prog = ConvexProgram::minimize(DVector::from_vec(vec![1., 1.]))
        .with_bounds(vec![Bound::between(1., 0.), Bound::free()]);
    assert!(matches!(prog.validate(), Err(SolverError::Dimension(_))));
    let prog = ConvexProgram::minimize(DVector::from_vec(vec![1., 1.]))
        .with_quadratic(DMatrix::identity(2, 2));
    assert!(prog.validate().is_ok());
    assert_eq!(prog.objective(&DVector::from_vec(vec![1., 2.])), 0.5 * 5. + 3.);
}
