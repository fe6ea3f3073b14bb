//! Convex-programming building blocks for two small decision problems over
//! synthetic or user-informed data:
//!
//! - The widest strip separating two labeled groups of points on the plane,
//! found by a linear program over (intercept, slope, margin);
//!
//! - Minimum-variance portfolio allocations and efficient frontiers, found by
//! one quadratic program per target return.
//!
//! Both problems are formulated as a [`optim::ConvexProgram`] and evaluated by
//! any [`optim::ConvexSolver`] (an interior-point backend is provided). Results
//! can be rendered as static SVG charts.

#[macro_use] extern crate log;

/// Points, labels, synthetic generation strategies and CSV input.
pub mod sample;

/// Generic convex programs and the solver boundary.
pub mod optim;

/// Estimators built over the solver boundary: max-margin separation and portfolio frontiers.
pub mod fit;

/// JSON configuration of a run, with defaults for every field.
pub mod config;

/// SVG charts for separators, frontiers and allocations.
pub mod render;
