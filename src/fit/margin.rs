use nalgebra::*;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::sample::{Point, Label, LabeledPoints};
use crate::optim::{Bound, ConvexProgram, ConvexSolver, SolverError};
use super::Estimator;

#[derive(Debug, Clone, Error)]
pub enum SeparationError {

    #[error("The {0} group has no points")]
    EmptyGroup(Label),

    #[error("Non-finite coordinate at {label} point {index}")]
    NonFinite { label : Label, index : usize },

    #[error("Invalid {name} bound {value} (must be positive and finite)")]
    InvalidBound { name : &'static str, value : f64 },

    /// The two groups cannot be separated by a strip of positive width: no
    /// feasible line exists, or the best margin is degenerate.
    #[error("Groups are not separable: {0}")]
    Infeasible(String),

    #[error(transparent)]
    Solver(SolverError)

}

impl From<SolverError> for SeparationError {

    fn from(e : SolverError) -> Self {
        match e {
            SolverError::Infeasible(msg) => SeparationError::Infeasible(msg),
            other => SeparationError::Solver(other)
        }
    }

}

/// Tuning of the max-margin program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginSettings {

    /// Bounds |intercept|, keeping the program well-posed for small or nearly
    /// collinear groups. None leaves the intercept free.
    pub intercept_bound : Option<f64>,

    /// Bounds |slope|. None leaves the slope free.
    pub slope_bound : Option<f64>,

    /// Optimal margins at or below this value are reported as infeasible
    /// (the groups touch or share a point).
    pub min_margin : f64

}

impl Default for MarginSettings {

    fn default() -> Self {
        Self { intercept_bound : Some(2000.), slope_bound : Some(2000.), min_margin : 1E-6 }
    }

}

impl MarginSettings {

    pub fn unbounded() -> Self {
        Self { intercept_bound : None, slope_bound : None, ..Default::default() }
    }

}

/// Line y = intercept + slope * x separating two groups of points, surrounded by
/// a strip of half-width margin that no point falls inside. Bottom points satisfy
/// intercept + slope * x - margin >= y; top points satisfy intercept + slope * x + margin <= y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Separator {

    pub intercept : f64,

    pub slope : f64,

    pub margin : f64

}

impl Separator {

    pub fn predict(&self, x : f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Lower and upper edges of the margin strip at x.
    pub fn band(&self, x : f64) -> (f64, f64) {
        let y = self.predict(x);
        (y - self.margin, y + self.margin)
    }

    /// Side of the line the point falls at. Points exactly over the line have no side.
    pub fn side(&self, pt : &Point) -> Option<Label> {
        let y = self.predict(pt.x);
        if pt.y > y {
            Some(Label::Top)
        } else if pt.y < y {
            Some(Label::Bottom)
        } else {
            None
        }
    }

    /// Amount by which a point breaks the strip constraint of its group
    /// (non-positive when the constraint holds).
    pub fn violation(&self, pt : &Point, label : Label) -> f64 {
        let y = self.predict(pt.x);
        match label {
            Label::Bottom => pt.y - (y - self.margin),
            Label::Top => (y + self.margin) - pt.y
        }
    }

    /// Largest violation over all points (NEG_INFINITY for an empty set).
    pub fn max_violation(&self, pts : &LabeledPoints) -> f64 {
        pts.iter()
            .map(|(p, l)| self.violation(&p, l) )
            .fold(f64::NEG_INFINITY, f64::max)
    }

}

fn check_bound(name : &'static str, bound : Option<f64>) -> Result<(), SeparationError> {
    match bound {
        Some(value) if !value.is_finite() || value <= 0. => {
            Err(SeparationError::InvalidBound { name, value })
        },
        _ => Ok(())
    }
}

/// Fails fast on inputs the program cannot represent.
fn check_input(pts : &LabeledPoints, settings : &MarginSettings) -> Result<(), SeparationError> {
    for label in [Label::Bottom, Label::Top].iter() {
        let group = pts.group(*label);
        if group.is_empty() {
            return Err(SeparationError::EmptyGroup(*label));
        }
        if let Some(index) = group.iter().position(|p| !p.is_finite() ) {
            return Err(SeparationError::NonFinite { label : *label, index });
        }
    }
    check_bound("intercept", settings.intercept_bound)?;
    check_bound("slope", settings.slope_bound)?;
    if !settings.min_margin.is_finite() || settings.min_margin < 0. {
        return Err(SeparationError::InvalidBound { name : "minimum margin", value : settings.min_margin });
    }
    Ok(())
}

/// Builds the linear program over (intercept, slope, margin):
///
/// minimize     -margin
/// subject to   -intercept - slope * x + margin <= -y    (bottom points)
///               intercept + slope * x + margin <=  y    (top points)
///               margin >= 0
///
/// with intercept and slope optionally limited to symmetric boxes.
pub fn formulate(pts : &LabeledPoints, settings : &MarginSettings) -> ConvexProgram {
    let nb = pts.bottom().len();
    let nt = pts.top().len();
    let mut a_ub = DMatrix::zeros(nb + nt, 3);
    let mut b_ub = DVector::zeros(nb + nt);
    for (i, p) in pts.bottom().iter().enumerate() {
        a_ub.row_mut(i).copy_from_slice(&[-1., -p.x, 1.]);
        b_ub[i] = -p.y;
    }
    for (i, p) in pts.top().iter().enumerate() {
        a_ub.row_mut(nb + i).copy_from_slice(&[1., p.x, 1.]);
        b_ub[nb + i] = p.y;
    }
    ConvexProgram::minimize(DVector::from_vec(vec![0., 0., -1.]))
        .with_inequalities(a_ub, b_ub)
        .with_bounds(vec![
            Bound::symmetric(settings.intercept_bound),
            Bound::symmetric(settings.slope_bound),
            Bound::nonnegative()
        ])
}

/// Finds the widest strip separating the bottom group (below) from the top group (above).
/// Fails with SeparationError::Infeasible if no strip of width above the minimum
/// margin exists; never returns a degenerate separator.
// Absolute slack accepted on the returned line, relative to the magnitudes in the rows.
fn violation_tolerance(pts : &LabeledPoints, sep : &Separator) -> f64 {
    let max_abs = |r : Option<(f64, f64)>| r.map(|(lo, hi)| lo.abs().max(hi.abs()) ).unwrap_or(0.);
    let scale = 1. + sep.intercept.abs() + sep.slope.abs() * max_abs(pts.x_range()) +
        max_abs(pts.y_range()) + sep.margin;
    1E-6 * scale
}

pub fn separate(
    pts : &LabeledPoints,
    settings : &MarginSettings,
    solver : &dyn ConvexSolver
) -> Result<Separator, SeparationError> {
    check_input(pts, settings)?;
    let prog = formulate(pts, settings);
    let sol = solver.solve(&prog)?;
    let sep = Separator { intercept : sol.x[0], slope : sol.x[1], margin : sol.x[2].max(0.) };
    if sep.margin <= settings.min_margin {
        return Err(SeparationError::Infeasible(format!(
            "optimal margin {:e} does not exceed the minimum of {:e}; groups touch or overlap",
            sep.margin,
            settings.min_margin
        )));
    }
    let worst = sep.max_violation(pts);
    let tol = violation_tolerance(pts, &sep);
    if worst > tol {
        return Err(SeparationError::Solver(SolverError::NotConverged(format!(
            "returned line leaves a point {:e} inside the strip (tolerance {:e})",
            worst,
            tol
        ))));
    }
    debug!(
        "Separated {} points with margin {} after {} iterations",
        pts.len(),
        sep.margin,
        sol.iterations
    );
    Ok(sep)
}

impl Estimator<LabeledPoints> for Separator {

    type Settings = MarginSettings;

    type Error = SeparationError;

    fn estimate(
        sample : &LabeledPoints,
        settings : &MarginSettings,
        solver : &dyn ConvexSolver
    ) -> Result<Self, SeparationError> {
        separate(sample, settings, solver)
    }

}

#[test]
fn formulation_rows() {
    let pts = LabeledPoints::from_pairs(&[(1., 2.)], &[(3., 4.)]);
    let prog = formulate(&pts, &MarginSettings::default());
    assert_eq!(prog.cost, DVector::from_vec(vec![0., 0., -1.]));
    assert_eq!(prog.a_ub, DMatrix::from_row_slice(2, 3, &[-1., -1., 1., 1., 3., 1.]));
    assert_eq!(prog.b_ub, DVector::from_vec(vec![-2., 4.]));
    assert_eq!(prog.bounds[0], Bound::between(-2000., 2000.));
    assert_eq!(prog.bounds[2], Bound::nonnegative());
    let prog = formulate(&pts, &MarginSettings::unbounded());
    assert_eq!(prog.bounds[1], Bound::free());
}

#[test]
fn separator_queries() {
    let sep = Separator { intercept : 1., slope : 2., margin : 0.5 };
    assert_eq!(sep.predict(1.), 3.);
    assert_eq!(sep.band(0.), (0.5, 1.5));
    assert_eq!(sep.side(&Point::new(0., 2.)), Some(Label::Top));
    assert_eq!(sep.side(&Point::new(0., 0.)), Some(Label::Bottom));
    assert_eq!(sep.side(&Point::new(0., 1.)), None);
    assert_eq!(sep.violation(&Point::new(0., 0.), Label::Bottom), -0.5);
    assert_eq!(sep.violation(&Point::new(0., 1.), Label::Top), 0.5);
}
