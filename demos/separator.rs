use std::error::Error;
use opr::sample::Generation;
use opr::optim::Clarabel;
use opr::fit::{self, MarginSettings};
use opr::render;

/* Heights (m) against weights (kg) drawn over the whole grid, with a 5kg gap cleared
around weight = 100 * height - 100 so that a hard margin exists. The separator is
free to find any line inside the gap. */

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let pts = Generation::default().generate()?;
    let solver = Clarabel::default();
    let sep = fit::separate(&pts, &MarginSettings::default(), &solver);
    let svg = render::separator_chart(&pts, sep.as_ref().ok())?;
    render::write_svg("separator.svg", &svg)?;
    match sep {
        Ok(s) => println!("weight = {:.3} + {:.3} * height (margin = {:.3})", s.intercept, s.slope, s.margin),
        Err(e) => println!("{}", e)
    }
    Ok(())
}
