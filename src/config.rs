use std::path::{Path, PathBuf};
use nalgebra::*;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::sample::{self, Generation, SampleError};
use crate::fit::{MarginSettings, Market, FrontierError};
use crate::optim::SolverSettings;

#[derive(Debug, Error)]
pub enum ConfigError {

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Market(#[from] FrontierError)

}

/// Everything a run depends on. Every field has a default, so a configuration file
/// only needs to carry the values it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {

    pub solver : SolverSettings,

    pub separation : SeparationConfig,

    pub frontier : FrontierConfig

}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {

    pub generation : Generation,

    pub margin : MarginSettings

}

/// Where the expected returns and covariances of a frontier run come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketSource {

    Synthetic {
        n_assets : usize,
        mean_range : (f64, f64),
        seed : u64
    },

    /// CSV table of per-period asset returns.
    Returns {
        path : PathBuf
    },

    Literal {
        names : Vec<String>,
        means : Vec<f64>,
        cov : Vec<Vec<f64>>
    }

}

impl Default for MarketSource {

    fn default() -> Self {
        MarketSource::Synthetic { n_assets : 5, mean_range : (0.05, 0.20), seed : 42 }
    }

}

impl MarketSource {

    pub fn build(&self) -> Result<Market, ConfigError> {
        match self {
            MarketSource::Synthetic { n_assets, mean_range, seed } => {
                Ok(Market::synthetic(*n_assets, *mean_range, *seed)?)
            },
            MarketSource::Returns { path } => {
                let (names, returns) = sample::load_returns(path)?;
                Ok(Market::from_returns(names, &returns)?)
            },
            MarketSource::Literal { names, means, cov } => {
                let n = means.len();
                if cov.len() != n || cov.iter().any(|row| row.len() != n ) {
                    return Err(FrontierError::InvalidMarket(format!(
                        "Covariance rows do not match the {} informed means", n
                    )).into());
                }
                let flat : Vec<f64> = cov.iter().flatten().cloned().collect();
                Ok(Market::new(
                    names.clone(),
                    DVector::from_vec(means.clone()),
                    DMatrix::from_row_slice(n, n, &flat[..])
                )?)
            }
        }
    }

}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {

    pub market : MarketSource,

    /// Number of target returns in the frontier sweep.
    pub targets : usize,

    /// Number of random portfolios drawn as chart background.
    pub random : usize,

    pub seed : u64

}

impl Default for FrontierConfig {

    fn default() -> Self {
        Self { market : MarketSource::default(), targets : 50, random : 5000, seed : 42 }
    }

}

impl Config {

    pub fn from_json(content : &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path : impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = sample::load_content_from_file(path)?;
        Self::from_json(&content)
    }

}

#[test]
fn partial_config_uses_defaults() {
    let cfg = Config::from_json(r#"{ "solver" : { "max_iter" : 50 }, "frontier" : { "targets" : 10 } }"#).unwrap();
    assert_eq!(cfg.solver.max_iter, 50);
    assert_eq!(cfg.solver.tolerance, SolverSettings::default().tolerance);
    assert_eq!(cfg.frontier.targets, 10);
    assert_eq!(cfg.frontier.random, 5000);
    assert_eq!(cfg.separation, SeparationConfig::default());
}

#[test]
fn literal_sources() {
    let cfg = Config::from_json(r#"{
        "separation" : {
            "generation" : { "kind" : "literal", "bottom" : [{ "x" : 0, "y" : 0 }], "top" : [{ "x" : 0, "y" : 1 }] },
            "margin" : { "slope_bound" : null }
        },
        "frontier" : {
            "market" : { "kind" : "literal", "names" : ["A", "B"], "means" : [0.1, 0.2], "cov" : [[1, 0], [0, 2]] }
        }
    }"#).unwrap();
    let pts = cfg.separation.generation.generate().unwrap();
    assert_eq!(pts.len(), 2);
    assert_eq!(cfg.separation.margin.slope_bound, None);
    assert_eq!(cfg.separation.margin.intercept_bound, Some(2000.));
    let market = cfg.frontier.market.build().unwrap();
    assert_eq!(market.cov[(1, 1)], 2.);
    let bad = MarketSource::Literal { names : vec!["A".into()], means : vec![0.1], cov : vec![vec![1., 0.]] };
    assert!(bad.build().is_err());
}

#[test]
fn missing_config_file_is_an_io_error() {
    let res = Config::load("no/such/dir/opr.json");
    assert!(matches!(res, Err(ConfigError::Sample(SampleError::Io(_)))));
}
