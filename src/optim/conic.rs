use nalgebra::{DMatrix, DVector};
use clarabel::algebra::*;
use clarabel::solver::*;
use super::{Bound, ConvexProgram, ConvexSolver, Solution, SolverError, SolverSettings};

/// Solves convex programs with the Clarabel primal-dual interior point method.
/// The program is rewritten in the conic form
///
/// minimize     0.5 x^T P x + q^T x
/// subject to   A x + s = b,  s in K
///
/// where equality rows take a zero cone and inequality rows (including the finite
/// variable bounds) take a nonnegative cone.
#[derive(Debug, Clone, Default)]
pub struct Clarabel {

    pub settings : SolverSettings

}

impl Clarabel {

    pub fn new(settings : SolverSettings) -> Self {
        Self { settings }
    }

}

/// Compressed-column copy of a dense matrix, skipping exact zeros. If upper is set,
/// only entries on or above the diagonal are kept.
fn dense_to_csc(m : &DMatrix<f64>, upper : bool) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(m.ncols() + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for j in 0..m.ncols() {
        let last = if upper { (j + 1).min(m.nrows()) } else { m.nrows() };
        for i in 0..last {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(m.nrows(), m.ncols(), colptr, rowval, nzval)
}

/// Stacks the equality rows, then the inequality rows, then one row per finite bound,
/// returning the constraint matrix, its right-hand side and the size of each cone.
fn stack_constraints(prog : &ConvexProgram) -> (DMatrix<f64>, DVector<f64>, usize, usize) {
    let n = prog.nvars();
    let n_bounds : usize = prog.bounds.iter()
        .map(|b| b.lower.is_some() as usize + b.upper.is_some() as usize )
        .sum();
    let n_eq = prog.a_eq.nrows();
    let n_ineq = prog.a_ub.nrows() + n_bounds;
    let mut a = DMatrix::zeros(n_eq + n_ineq, n);
    let mut b = DVector::zeros(n_eq + n_ineq);
    a.rows_mut(0, n_eq).copy_from(&prog.a_eq);
    b.rows_mut(0, n_eq).copy_from(&prog.b_eq);
    a.rows_mut(n_eq, prog.a_ub.nrows()).copy_from(&prog.a_ub);
    b.rows_mut(n_eq, prog.a_ub.nrows()).copy_from(&prog.b_ub);
    let mut row = n_eq + prog.a_ub.nrows();
    for (i, Bound { lower, upper }) in prog.bounds.iter().enumerate() {
        if let Some(l) = lower {
            // -x_i <= -l
            a[(row, i)] = -1.;
            b[row] = -l;
            row += 1;
        }
        if let Some(u) = upper {
            a[(row, i)] = 1.;
            b[row] = *u;
            row += 1;
        }
    }
    (a, b, n_eq, n_ineq)
}

impl ConvexSolver for Clarabel {

    fn solve(&self, prog : &ConvexProgram) -> Result<Solution, SolverError> {
        prog.validate()?;
        let n = prog.nvars();
        let p = match &prog.quadratic {
            Some(q) => dense_to_csc(&(0.5 * (q + q.transpose())), true),
            None => CscMatrix::zeros((n, n))
        };
        let q : Vec<f64> = prog.cost.iter().cloned().collect();
        let (a_dense, b_dense, n_eq, n_ineq) = stack_constraints(prog);
        let a = dense_to_csc(&a_dense, false);
        let b : Vec<f64> = b_dense.iter().cloned().collect();
        let mut cones = Vec::new();
        if n_eq > 0 {
            cones.push(ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(NonnegativeConeT(n_ineq));
        }
        let tol = self.settings.tolerance;
        let settings = DefaultSettingsBuilder::<f64>::default()
            .verbose(self.settings.verbose)
            .max_iter(self.settings.max_iter)
            .tol_gap_abs(tol)
            .tol_gap_rel(tol)
            .tol_feas(tol)
            .build()
            .map_err(|e| SolverError::Settings(format!("{}", e)))?;
        debug!(
            "Solving program with {} variables, {} equality and {} inequality rows",
            n, n_eq, n_ineq
        );
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();
        let status = solver.solution.status;
        let iterations = solver.solution.iterations;
        let msg = format!("solver status {:?} after {} iterations", status, iterations);
        debug!("{}", msg);
        match status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                if matches!(status, SolverStatus::AlmostSolved) {
                    warn!("Accepting reduced-accuracy solution ({})", msg);
                }
                let x = DVector::from_vec(solver.solution.x.clone());
                let objective = prog.objective(&x);
                Ok(Solution { x, objective, iterations })
            },
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                Err(SolverError::Infeasible(msg))
            },
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                Err(SolverError::Unbounded(msg))
            },
            _ => Err(SolverError::NotConverged(msg))
        }
    }

}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn csc_conversion_keeps_nonzeros() {
        let m = DMatrix::from_row_slice(2, 3, &[1., 0., 2., 0., 3., 4.]);
        let csc = dense_to_csc(&m, false);
        assert_eq!(csc.colptr, vec![0, 1, 2, 4]);
        assert_eq!(csc.rowval, vec![0, 1, 0, 1]);
        assert_eq!(csc.nzval, vec![1., 3., 2., 4.]);
        let sq = DMatrix::from_row_slice(2, 2, &[1., 2., 2., 5.]);
        let triu = dense_to_csc(&sq, true);
        assert_eq!(triu.nzval, vec![1., 2., 5.]);
    }

    #[test]
    fn bounds_become_inequality_rows() {
        let prog = ConvexProgram::minimize(DVector::from_vec(vec![1., 1.]))
            .with_bounds(vec![Bound::nonnegative(), Bound::between(-1., 1.)]);
        let (a, b, n_eq, n_ineq) = stack_constraints(&prog);
        assert_eq!((n_eq, n_ineq), (0, 3));
        assert_eq!(a, DMatrix::from_row_slice(3, 2, &[-1., 0., 0., -1., 0., 1.]));
        assert_eq!(b, DVector::from_vec(vec![0., 1., 1.]));
    }

    #[test]
    fn small_linear_program() {
        // max x + y st x + 2y <= 4, 3x + y <= 6, x, y >= 0; optimum at (1.6, 1.2)
        let prog = ConvexProgram::minimize(DVector::from_vec(vec![-1., -1.]))
            .with_inequalities(
                DMatrix::from_row_slice(2, 2, &[1., 2., 3., 1.]),
                DVector::from_vec(vec![4., 6.])
            )
            .with_bounds(vec![Bound::nonnegative(); 2]);
        let sol = Clarabel::default().solve(&prog).unwrap();
        assert!((sol.x[0] - 1.6).abs() < 1E-6);
        assert!((sol.x[1] - 1.2).abs() < 1E-6);
        assert!((sol.objective + 2.8).abs() < 1E-6);
    }

    #[test]
    fn infeasible_linear_program() {
        // x <= -1 with x >= 0
        let prog = ConvexProgram::minimize(DVector::from_vec(vec![1.]))
            .with_inequalities(DMatrix::from_element(1, 1, 1.), DVector::from_element(1, -1.))
            .with_bounds(vec![Bound::nonnegative()]);
        assert!(matches!(Clarabel::default().solve(&prog), Err(SolverError::Infeasible(_))));
    }

    #[test]
    fn unbounded_linear_program() {
        let prog = ConvexProgram::minimize(DVector::from_vec(vec![-1.]))
            .with_bounds(vec![Bound::nonnegative()]);
        assert!(matches!(Clarabel::default().solve(&prog), Err(SolverError::Unbounded(_))));
    }

    #[test]
    fn equality_constrained_quadratic_program() {
        // min 0.5 (x^2 + y^2) st x + y = 1
        let prog = ConvexProgram::minimize(DVector::zeros(2))
            .with_quadratic(DMatrix::identity(2, 2))
            .with_equalities(DMatrix::from_row_slice(1, 2, &[1., 1.]), DVector::from_element(1, 1.));
        let sol = Clarabel::default().solve(&prog).unwrap();
        assert!((sol.x[0] - 0.5).abs() < 1E-6);
        assert!((sol.x[1] - 0.5).abs() < 1E-6);
        assert!((sol.objective - 0.25).abs() < 1E-6);
    }

}
