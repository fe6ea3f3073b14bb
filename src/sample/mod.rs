use std::fmt::{self, Display};
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use thiserror::Error;

/// Reading labeled points and asset return tables from CSV content.
pub mod table;

pub use table::*;

#[derive(Debug, Error)]
pub enum SampleError {

    #[error("Invalid {name} range [{low}, {high}]")]
    InvalidRange { name : &'static str, low : f64, high : f64 },

    #[error("Invalid gap width {0}")]
    InvalidGap(f64),

    #[error("Unknown point label '{0}'")]
    UnknownLabel(String),

    #[error("Non-finite value at row {0}")]
    NonFinite(usize),

    #[error("Table has no data rows")]
    Empty,

    #[error("Row {row} has {found} fields (expected {expected})")]
    RowLength { row : usize, found : usize, expected : usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error)

}

/// A single observation on the plane: a feature (x) and a target (y),
/// e.g. height and weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {

    pub x : f64,

    pub y : f64

}

impl Point {

    pub fn new(x : f64, y : f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

}

impl From<(f64, f64)> for Point {

    fn from(p : (f64, f64)) -> Self {
        Self { x : p.0, y : p.1 }
    }

}

/// Which side of the separating strip a point is expected at. Labels are always
/// supplied by the caller: Bottom points should stay below the strip and Top points
/// above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Bottom,
    Top
}

impl Display for Label {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Bottom => write!(f, "bottom"),
            Label::Top => write!(f, "top")
        }
    }

}

impl FromStr for Label {

    type Err = SampleError;

    /// Accepts the numeric labels 0/1 as well as their names.
    fn from_str(s : &str) -> Result<Self, SampleError> {
        match s.trim().to_lowercase().as_str() {
            "0" | "bottom" => Ok(Label::Bottom),
            "1" | "top" => Ok(Label::Top),
            other => Err(SampleError::UnknownLabel(other.to_string()))
        }
    }

}

/// Two groups of points, partitioned by caller-supplied labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoints {

    bottom : Vec<Point>,

    top : Vec<Point>

}

impl LabeledPoints {

    pub fn new(bottom : Vec<Point>, top : Vec<Point>) -> Self {
        Self { bottom, top }
    }

    pub fn from_pairs(bottom : &[(f64, f64)], top : &[(f64, f64)]) -> Self {
        Self {
            bottom : bottom.iter().map(|p| Point::from(*p) ).collect(),
            top : top.iter().map(|p| Point::from(*p) ).collect()
        }
    }

    pub fn push(&mut self, pt : Point, label : Label) {
        match label {
            Label::Bottom => self.bottom.push(pt),
            Label::Top => self.top.push(pt)
        }
    }

    pub fn bottom(&self) -> &[Point] {
        &self.bottom[..]
    }

    pub fn top(&self) -> &[Point] {
        &self.top[..]
    }

    pub fn group(&self, label : Label) -> &[Point] {
        match label {
            Label::Bottom => self.bottom(),
            Label::Top => self.top()
        }
    }

    pub fn len(&self) -> usize {
        self.bottom.len() + self.top.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all points, bottom group first.
    pub fn iter(&self) -> impl Iterator<Item=(Point, Label)> + '_ {
        self.bottom.iter().map(|p| (*p, Label::Bottom) )
            .chain(self.top.iter().map(|p| (*p, Label::Top) ))
    }

    /// Smallest and largest x over both groups.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        extent(self.iter().map(|(p, _)| p.x ))
    }

    /// Smallest and largest y over both groups.
    pub fn y_range(&self) -> Option<(f64, f64)> {
        extent(self.iter().map(|(p, _)| p.y ))
    }

}

impl std::iter::FromIterator<(Point, Label)> for LabeledPoints {

    fn from_iter<I : IntoIterator<Item=(Point, Label)>>(iter : I) -> Self {
        let mut pts = LabeledPoints::default();
        for (p, l) in iter {
            pts.push(p, l);
        }
        pts
    }

}

pub(crate) fn extent(vals : impl Iterator<Item=f64>) -> Option<(f64, f64)> {
    vals.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v)))
    })
}

/// Strategy used to build the labeled point set of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generation {

    /// Draws count points uniformly over the x_range * y_range rectangle, then clears
    /// every point within gap (measured vertically) of the reference line
    /// y = intercept + slope * x, so that a strictly positive margin always exists.
    /// Remaining points are labeled Top if they lie above the reference line.
    Grid {
        count : usize,
        x_range : (f64, f64),
        y_range : (f64, f64),
        intercept : f64,
        slope : f64,
        gap : f64,
        seed : u64
    },

    /// Fixed groups informed by the user.
    Literal {
        bottom : Vec<Point>,
        top : Vec<Point>
    }

}

impl Default for Generation {

    /// Heights in [1.4, 2.2] m against weights in [50, 130] kg, with a 5 kg gap
    /// cleared around weight = 100 * height - 100.
    fn default() -> Self {
        Generation::Grid {
            count : 400,
            x_range : (1.4, 2.2),
            y_range : (50., 130.),
            intercept : -100.,
            slope : 100.,
            gap : 5.,
            seed : 42
        }
    }

}

fn check_range(name : &'static str, range : (f64, f64)) -> Result<(), SampleError> {
    let (low, high) = range;
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(SampleError::InvalidRange { name, low, high });
    }
    Ok(())
}

impl Generation {

    /// Replaces the seed of a grid strategy. Literal strategies are unaffected.
    pub fn reseed(&mut self, new_seed : u64) {
        if let Generation::Grid { seed, .. } = self {
            *seed = new_seed;
        }
    }

    pub fn generate(&self) -> Result<LabeledPoints, SampleError> {
        match self {
            Generation::Grid { count, x_range, y_range, intercept, slope, gap, seed } => {
                check_range("x", *x_range)?;
                check_range("y", *y_range)?;
                if !gap.is_finite() || *gap < 0. {
                    return Err(SampleError::InvalidGap(*gap));
                }
                let mut rng = StdRng::seed_from_u64(*seed);
                let xs : Vec<f64> = Uniform::new(x_range.0, x_range.1)
                    .sample_iter(&mut rng)
                    .take(*count)
                    .collect();
                let ys : Vec<f64> = Uniform::new(y_range.0, y_range.1)
                    .sample_iter(&mut rng)
                    .take(*count)
                    .collect();
                let pts : LabeledPoints = xs.into_iter().zip(ys)
                    .filter_map(|(x, y)| {
                        let dist = y - (intercept + slope * x);
                        if dist.abs() > *gap {
                            let label = if dist > 0. { Label::Top } else { Label::Bottom };
                            Some((Point::new(x, y), label))
                        } else {
                            None
                        }
                    })
                    .collect();
                debug!(
                    "Generated {} points ({} bottom, {} top) from {} draws",
                    pts.len(),
                    pts.bottom().len(),
                    pts.top().len(),
                    count
                );
                Ok(pts)
            },
            Generation::Literal { bottom, top } => {
                Ok(LabeledPoints::new(bottom.clone(), top.clone()))
            }
        }
    }

}

#[test]
fn grid_generation_clears_gap() {
    let gen = Generation::default();
    let pts = gen.generate().unwrap();
    assert!(pts.len() < 400);
    assert!(!pts.bottom().is_empty() && !pts.top().is_empty());
    for (p, label) in pts.iter() {
        let dist = p.y - (100. * p.x - 100.);
        assert!(dist.abs() > 5.);
        match label {
            Label::Top => assert!(dist > 0.),
            Label::Bottom => assert!(dist < 0.)
        }
    }
}

#[test]
fn grid_generation_is_seeded() {
    let gen = Generation::default();
    assert_eq!(gen.generate().unwrap(), gen.generate().unwrap());
    let mut other = gen.clone();
    other.reseed(7);
    assert_ne!(gen.generate().unwrap(), other.generate().unwrap());
}

#[test]
fn grid_generation_rejects_reversed_range() {
    let gen = Generation::Grid {
        count : 10,
        x_range : (2., 1.),
        y_range : (0., 1.),
        intercept : 0.,
        slope : 1.,
        gap : 0.1,
        seed : 1
    };
    assert!(matches!(gen.generate(), Err(SampleError::InvalidRange { name : "x", .. })));
}

#[test]
fn label_parsing() {
    assert_eq!("0".parse::<Label>().unwrap(), Label::Bottom);
    assert_eq!(" Top ".parse::<Label>().unwrap(), Label::Top);
    assert!("left".parse::<Label>().is_err());
}
