use approx::assert_abs_diff_eq;
use nalgebra::*;
use opr::sample::{Generation, LabeledPoints, Label, Point};
use opr::optim::{Bound, Clarabel, ConvexSolver, ConvexProgram, Solution, SolverError};
use opr::fit::{self, Estimator, Frontier, Market, MarginSettings, SeparationError, Separator, SweepSettings};
use opr::fit::margin;
use std::cell::Cell;

const EPS : f64 = 1E-5;

fn solver() -> Clarabel {
    Clarabel::default()
}

fn check_invariant(pts : &LabeledPoints, sep : &Separator) {
    for p in pts.bottom() {
        assert!(sep.predict(p.x) - sep.margin >= p.y - 1E-6, "bottom point {:?} inside strip", p);
    }
    for p in pts.top() {
        assert!(sep.predict(p.x) + sep.margin <= p.y + 1E-6, "top point {:?} inside strip", p);
    }
}

#[test]
fn horizontal_gap_of_ten() {
    let pts = LabeledPoints::from_pairs(&[(0., 0.), (1., 0.)], &[(0., 10.), (1., 10.)]);
    let sep = fit::separate(&pts, &MarginSettings::default(), &solver()).unwrap();
    assert_abs_diff_eq!(sep.margin, 5., epsilon = EPS);
    assert_abs_diff_eq!(sep.intercept, 5., epsilon = EPS);
    assert_abs_diff_eq!(sep.slope, 0., epsilon = EPS);
    check_invariant(&pts, &sep);
}

#[test]
fn horizontal_gap_of_four() {
    let pts = LabeledPoints::from_pairs(&[(0., 0.), (2., 0.)], &[(0., 4.), (2., 4.)]);
    let sep = fit::separate(&pts, &MarginSettings::default(), &solver()).unwrap();
    assert_abs_diff_eq!(sep.margin, 2., epsilon = EPS);
    assert_abs_diff_eq!(sep.intercept, 2., epsilon = EPS);
    assert_abs_diff_eq!(sep.slope, 0., epsilon = EPS);
    check_invariant(&pts, &sep);
}

#[test]
fn shared_point_is_infeasible() {
    let pts = LabeledPoints::from_pairs(&[(0., 0.)], &[(0., 0.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &solver());
    assert!(matches!(res, Err(SeparationError::Infeasible(_))), "{:?}", res);
}

#[test]
fn shared_point_among_others_is_infeasible() {
    let pts = LabeledPoints::from_pairs(&[(0., 0.), (1., 1.), (3., -2.)], &[(1., 1.), (0., 5.), (2., 6.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &solver());
    assert!(matches!(res, Err(SeparationError::Infeasible(_))), "{:?}", res);
}

#[test]
fn overlapping_groups_are_infeasible() {
    // A bottom point above a top point at the same x.
    let pts = LabeledPoints::from_pairs(&[(0., 1.), (1., 0.)], &[(0., 0.), (1., 2.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &solver());
    match res {
        Err(SeparationError::Infeasible(msg)) => assert!(!msg.is_empty()),
        other => panic!("Expected infeasibility, got {:?}", other)
    }
}

#[test]
fn empty_group_fails_before_solving() {
    struct Panicking;
    impl ConvexSolver for Panicking {
        fn solve(&self, _prog : &ConvexProgram) -> Result<Solution, SolverError> {
            panic!("Solver should not be called");
        }
    }
    let pts = LabeledPoints::from_pairs(&[], &[(0., 1.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &Panicking);
    assert!(matches!(res, Err(SeparationError::EmptyGroup(Label::Bottom))));
    let pts = LabeledPoints::new(vec![Point::new(f64::NAN, 0.)], vec![Point::new(0., 1.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &Panicking);
    assert!(matches!(res, Err(SeparationError::NonFinite { label : Label::Bottom, index : 0 })));
    let settings = MarginSettings { slope_bound : Some(-1.), ..MarginSettings::default() };
    let pts = LabeledPoints::from_pairs(&[(0., 0.)], &[(0., 1.)]);
    let res = fit::separate(&pts, &settings, &Panicking);
    assert!(matches!(res, Err(SeparationError::InvalidBound { name : "slope", .. })));
}

#[test]
fn generated_grid_is_separated() {
    let pts = Generation::default().generate().unwrap();
    let sep = fit::separate(&pts, &MarginSettings::default(), &solver()).unwrap();
    // The cleared gap is 5kg at each side of the reference line.
    assert!(sep.margin >= 5. - EPS);
    check_invariant(&pts, &sep);
    assert!(sep.max_violation(&pts) <= 1E-6);
}

#[test]
fn separation_is_idempotent() {
    let pts = Generation::default().generate().unwrap();
    let a = fit::separate(&pts, &MarginSettings::default(), &solver()).unwrap();
    let b = Separator::estimate(&pts, &MarginSettings::default(), &solver()).unwrap();
    assert_abs_diff_eq!(a.margin, b.margin, epsilon = 1E-9);
}

#[test]
fn labels_are_taken_from_the_caller() {
    // Same points with swapped groups: no line keeps the new bottom group below the top one.
    let pts = LabeledPoints::from_pairs(&[(0., 10.), (1., 10.)], &[(0., 0.), (1., 0.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &solver());
    assert!(matches!(res, Err(SeparationError::Infeasible(_))));
}

#[test]
fn formulation_is_solver_independent() {
    struct Counting<'a>(Clarabel, &'a Cell<usize>);
    impl<'a> ConvexSolver for Counting<'a> {
        fn solve(&self, prog : &ConvexProgram) -> Result<Solution, SolverError> {
            self.1.set(self.1.get() + 1);
            assert_eq!(prog.nvars(), 3);
            self.0.solve(prog)
        }
    }
    let calls = Cell::new(0);
    let pts = LabeledPoints::from_pairs(&[(0., 0.), (1., 0.)], &[(0., 10.), (1., 10.)]);
    let prog = margin::formulate(&pts, &MarginSettings::default());
    assert_eq!(prog.a_ub.nrows(), 4);
    let sep = fit::separate(&pts, &MarginSettings::default(), &Counting(solver(), &calls)).unwrap();
    assert_eq!(calls.get(), 1);
    assert_abs_diff_eq!(sep.margin, 5., epsilon = EPS);
}

#[test]
fn unbounded_separator_is_a_solver_error() {
    let pts = LabeledPoints::from_pairs(&[(0., 0.)], &[(1., 0.)]);
    let res = fit::separate(&pts, &MarginSettings::unbounded(), &solver());
    assert!(matches!(res, Err(SeparationError::Solver(SolverError::Unbounded(_)))));

    // The default box keeps the same program bounded: the line is as steep as allowed.
    let sep = fit::separate(&pts, &MarginSettings::default(), &solver()).unwrap();
    assert_abs_diff_eq!(sep.margin, 1000., epsilon = 1E-3);
    assert_abs_diff_eq!(sep.slope, -2000., epsilon = 1E-3);
    check_invariant(&pts, &sep);
}

#[test]
fn inaccurate_solution_is_rejected() {
    // Reports a wide margin around a flat line through the points.
    struct Sloppy;
    impl ConvexSolver for Sloppy {
        fn solve(&self, _prog : &ConvexProgram) -> Result<Solution, SolverError> {
            Ok(Solution { x : DVector::from_vec(vec![5., 0., 10.]), objective : -10., iterations : 1 })
        }
    }
    let pts = LabeledPoints::from_pairs(&[(0., 0.), (1., 0.)], &[(0., 10.), (1., 10.)]);
    let res = fit::separate(&pts, &MarginSettings::default(), &Sloppy);
    assert!(matches!(res, Err(SeparationError::Solver(SolverError::NotConverged(_)))));
}

fn two_assets() -> Market {
    Market::unnamed(
        DVector::from_vec(vec![0.1, 0.2]),
        DMatrix::from_row_slice(2, 2, &[1., 0., 0., 4.])
    ).unwrap()
}

#[test]
fn global_minimum_variance() {
    let market = two_assets();
    let port = fit::min_variance(&market, None, &solver()).unwrap();
    assert_abs_diff_eq!(port.weights[0], 0.8, epsilon = EPS);
    assert_abs_diff_eq!(port.weights[1], 0.2, epsilon = EPS);
    assert_abs_diff_eq!(port.risk, 0.4, epsilon = EPS);
    assert_abs_diff_eq!(port.expected_return, 0.12, epsilon = EPS);
}

#[test]
fn target_return_is_reached() {
    let market = two_assets();
    let port = fit::min_variance(&market, Some(0.15), &solver()).unwrap();
    assert_abs_diff_eq!(port.weights[0], 0.5, epsilon = EPS);
    assert_abs_diff_eq!(port.expected_return, 0.15, epsilon = EPS);
    let res = fit::min_variance(&market, Some(0.5), &solver());
    assert!(res.is_err());
}

#[test]
fn frontier_portfolios_are_feasible() {
    let market = Market::synthetic(5, (0.05, 0.20), 42).unwrap();
    let frontier = fit::efficient_frontier(&market, 20, &solver()).unwrap();
    assert_eq!(frontier.portfolios.len() + frontier.skipped.len(), 20);
    assert!(frontier.portfolios.len() >= 18);
    let targets = fit::target_grid(&market, 20).unwrap();
    for port in frontier.portfolios.iter() {
        assert_abs_diff_eq!(port.weights.sum(), 1., epsilon = EPS);
        assert!(port.weights.iter().all(|w| Bound::between(0., 1.).contains(*w, EPS) ));
        assert!(targets.iter().any(|t| (t - port.expected_return).abs() < EPS ));
    }
    let gmv = fit::min_variance(&market, None, &solver()).unwrap();
    let upper : Vec<_> = frontier.portfolios.iter()
        .filter(|p| p.expected_return >= gmv.expected_return )
        .collect();
    for pair in upper.windows(2) {
        assert!(pair[1].risk >= pair[0].risk - 1E-6);
    }
    for port in frontier.portfolios.iter() {
        assert!(port.risk >= gmv.risk - 1E-6);
    }
}

#[test]
fn frontier_estimator_and_progress() {
    let market = two_assets();
    let mut steps = Vec::new();
    let frontier = fit::efficient_frontier_with(&market, 5, &solver(), |i, t, p| steps.push((i, t, p.is_some())) ).unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps.iter().filter(|(_, _, ok)| *ok ).count(), frontier.portfolios.len());
    assert!(steps[1..4].iter().all(|(_, _, ok)| *ok ));
    assert_abs_diff_eq!(steps[4].1, 0.2, epsilon = 1E-12);
    let est = Frontier::estimate(&market, &SweepSettings { targets : 5 }, &solver()).unwrap();
    assert_eq!(est.portfolios.len(), frontier.portfolios.len());
    // Only the second asset reaches the largest target.
    if let Some(last) = frontier.portfolios.last().filter(|p| (p.expected_return - 0.2).abs() < EPS ) {
        assert_abs_diff_eq!(last.weights[1], 1., epsilon = 1E-4);
    }
}

#[test]
fn random_portfolios_are_normalized() {
    let market = two_assets();
    let ports = fit::random_portfolios(&market, 100, 7);
    assert_eq!(ports.len(), 100);
    for p in ports.iter() {
        assert_abs_diff_eq!(p.weights.sum(), 1., epsilon = 1E-12);
        assert!(p.expected_return >= 0.1 - 1E-12 && p.expected_return <= 0.2 + 1E-12);
    }
    assert_eq!(ports, fit::random_portfolios(&market, 100, 7));
}
