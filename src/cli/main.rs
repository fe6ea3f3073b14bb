use std::path::{Path, PathBuf};
use structopt::StructOpt;
use anyhow::Context;
use log::info;
use indicatif::ProgressBar;
use serde_json::json;
use opr::config::Config;
use opr::sample::{self, LabeledPoints};
use opr::optim::Clarabel;
use opr::fit::{self, Allocation, Market, MarginSettings, SeparationError};
use opr::render;

/// Max-margin separation and mean-variance portfolio frontiers from the command line
#[derive(StructOpt, Debug)]
#[structopt(name = "opr")]
pub struct Opr {

    /// JSON configuration file. Missing fields take their default values.
    #[structopt(short, long, parse(from_os_str))]
    config : Option<PathBuf>,

    #[structopt(subcommand)]
    cmd : Command

}

#[derive(StructOpt, Debug)]
pub enum Command {

    /// Finds the widest strip separating a bottom from a top group of points, printing
    /// the separating line (intercept, slope) and the margin.
    Separate {

        /// CSV file with x, y and label (0/1 or bottom/top) columns. Points are generated
        /// from the configured strategy if absent.
        #[structopt(short, long, parse(from_os_str))]
        data : Option<PathBuf>,

        /// Destination of the SVG chart
        #[structopt(short, long, parse(from_os_str))]
        output : Option<PathBuf>,

        /// Overrides the seed of generated points
        #[structopt(long)]
        seed : Option<u64>,

        /// Leaves intercept and slope unbounded
        #[structopt(long)]
        unbounded : bool
    },

    /// Traces the efficient frontier of a market, printing one minimum-risk portfolio
    /// per target return.
    Frontier {

        /// CSV file of per-period asset returns (header with asset names). The configured
        /// market is used if absent.
        #[structopt(short, long, parse(from_os_str))]
        returns : Option<PathBuf>,

        /// Destination of the SVG chart
        #[structopt(short, long, parse(from_os_str))]
        output : Option<PathBuf>,

        /// Number of target returns
        #[structopt(long)]
        targets : Option<usize>,

        /// Number of random portfolios drawn behind the frontier
        #[structopt(long)]
        random : Option<usize>,

        /// Seed of the random portfolios
        #[structopt(long)]
        seed : Option<u64>
    },

    /// Shows the minimum-risk allocation of a market (optionally at a target return),
    /// or a literal allocation informed by --weights.
    Allocation {

        #[structopt(short, long, parse(from_os_str))]
        returns : Option<PathBuf>,

        /// Target expected return. The global minimum-variance portfolio is used if absent.
        #[structopt(long)]
        target : Option<f64>,

        /// Comma-separated literal weights
        #[structopt(long, use_delimiter = true)]
        weights : Option<Vec<f64>>,

        /// Comma-separated asset labels of literal weights
        #[structopt(long, use_delimiter = true)]
        labels : Option<Vec<String>>,

        /// Risk figure shown with literal weights
        #[structopt(long)]
        risk : Option<f64>,

        /// Destination of the SVG chart
        #[structopt(short, long, parse(from_os_str))]
        output : Option<PathBuf>
    }

}

fn save_chart(path : &Path, svg : &str) -> anyhow::Result<()> {
    render::write_svg(path, svg)
        .with_context(|| format!("Writing chart to {}", path.display()))?;
    info!("Chart written to {}", path.display());
    Ok(())
}

fn load_market(config : &Config, returns : &Option<PathBuf>) -> anyhow::Result<Market> {
    match returns {
        Some(path) => {
            let (names, table) = sample::load_returns(path)
                .with_context(|| format!("Reading returns from {}", path.display()))?;
            Ok(Market::from_returns(names, &table)?)
        },
        None => Ok(config.frontier.market.build()?)
    }
}

fn separate(
    config : &Config,
    solver : &Clarabel,
    data : &Option<PathBuf>,
    output : &Option<PathBuf>,
    seed : Option<u64>,
    unbounded : bool
) -> anyhow::Result<()> {
    let pts : LabeledPoints = match data {
        Some(path) => sample::load_labeled_points(path)
            .with_context(|| format!("Reading points from {}", path.display()))?,
        None => {
            let mut gen = config.separation.generation.clone();
            if let Some(s) = seed {
                gen.reseed(s);
            }
            gen.generate()?
        }
    };
    info!("Separating {} bottom and {} top points", pts.bottom().len(), pts.top().len());
    let settings = if unbounded {
        MarginSettings { intercept_bound : None, slope_bound : None, ..config.separation.margin }
    } else {
        config.separation.margin
    };
    match fit::separate(&pts, &settings, solver) {
        Ok(sep) => {
            if let Some(path) = output {
                save_chart(path, &render::separator_chart(&pts, Some(&sep))?)?;
            }
            println!("{}", serde_json::to_string_pretty(&sep)?);
            Ok(())
        },
        Err(e @ SeparationError::Infeasible(_)) => {
            if let Some(path) = output {
                save_chart(path, &render::separator_chart(&pts, None)?)?;
            }
            Err(e.into())
        },
        Err(e) => Err(e.into())
    }
}

fn frontier(
    config : &Config,
    solver : &Clarabel,
    returns : &Option<PathBuf>,
    output : &Option<PathBuf>,
    targets : Option<usize>,
    random : Option<usize>,
    seed : Option<u64>
) -> anyhow::Result<()> {
    let market = load_market(config, returns)?;
    let targets = targets.unwrap_or(config.frontier.targets);
    let bar = ProgressBar::new(targets as u64);
    let frontier = fit::efficient_frontier_with(&market, targets, solver, |_, _, _| bar.inc(1) );
    bar.finish_and_clear();
    let frontier = frontier?;
    info!("Frontier has {} portfolios ({} targets skipped)", frontier.portfolios.len(), frontier.skipped.len());
    if let Some(path) = output {
        let random = fit::random_portfolios(
            &market,
            random.unwrap_or(config.frontier.random),
            seed.unwrap_or(config.frontier.seed)
        );
        save_chart(path, &render::frontier_chart(&frontier, &random[..])?)?;
    }
    let summary = json!({ "assets" : market.names, "frontier" : frontier });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn allocation(
    config : &Config,
    solver : &Clarabel,
    returns : &Option<PathBuf>,
    target : Option<f64>,
    weights : &Option<Vec<f64>>,
    labels : &Option<Vec<String>>,
    risk : Option<f64>,
    output : &Option<PathBuf>
) -> anyhow::Result<()> {
    let alloc = match weights {
        Some(w) => Allocation::new(labels.clone(), w.clone(), risk)?,
        None => {
            let market = load_market(config, returns)?;
            let port = fit::min_variance(&market, target, solver)?;
            Allocation::from_portfolio(&market, &port)
        }
    };
    if let Some(path) = output {
        save_chart(path, &render::allocation_chart(&alloc)?)?;
    }
    let summary = json!({
        "labels" : alloc.labels,
        "weights" : alloc.weights,
        "shares" : alloc.shares(),
        "risk" : alloc.risk
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let opr = Opr::from_args();
    let config = match &opr.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Loading configuration from {}", path.display()))?,
        None => Config::default()
    };
    let solver = Clarabel::new(config.solver);
    match &opr.cmd {
        Command::Separate { data, output, seed, unbounded } => {
            separate(&config, &solver, data, output, *seed, *unbounded)
        },
        Command::Frontier { returns, output, targets, random, seed } => {
            frontier(&config, &solver, returns, output, *targets, *random, *seed)
        },
        Command::Allocation { returns, target, weights, labels, risk, output } => {
            allocation(&config, &solver, returns, *target, weights, labels, *risk, output)
        }
    }
}
