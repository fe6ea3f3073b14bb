use crate::optim::ConvexSolver;

/// Maximum-margin linear separation of two labeled point groups, as a linear program.
pub mod margin;

/// Minimum-variance portfolios and efficient frontiers, as sequences of quadratic programs.
pub mod frontier;

pub use margin::{Separator, MarginSettings, SeparationError, separate};

pub use frontier::{
    Market,
    Portfolio,
    Frontier,
    Allocation,
    FrontierError,
    SweepSettings,
    min_variance,
    target_grid,
    efficient_frontier,
    efficient_frontier_with,
    random_portfolios
};

/// Trait shared by the estimators that reduce a sample to a convex program, parametrized
/// by the sample type. Estimators do not own a solver: the caller passes one in, so the same
/// formulation can be evaluated by any ConvexSolver implementor (and inspected without solving,
/// via the formulate(.) functions of each module).
pub trait Estimator<S>
where
    Self : Sized
{

    type Settings;

    type Error;

    /// Builds and solves the program for the informed sample.
    fn estimate(
        sample : &S,
        settings : &Self::Settings,
        solver : &dyn ConvexSolver
    ) -> Result<Self, Self::Error>;

}
