use std::error::Error;
use opr::optim::Clarabel;
use opr::fit::{self, Market};
use opr::render;

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();

    // With real data, means and covariances would come from Market::from_returns.
    let market = Market::synthetic(5, (0.05, 0.20), 42)?;
    let solver = Clarabel::default();
    let frontier = fit::efficient_frontier(&market, 50, &solver)?;
    let random = fit::random_portfolios(&market, 5000, 42);
    render::write_svg("frontier.svg", &render::frontier_chart(&frontier, &random[..])?)?;
    for port in frontier.portfolios.iter() {
        println!(
            "return = {:.4}  risk = {:.6}  volatility = {:.4}",
            port.expected_return,
            port.risk,
            port.volatility()
        );
    }
    Ok(())
}
