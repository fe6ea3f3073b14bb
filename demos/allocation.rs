use std::error::Error;
use opr::fit::Allocation;
use opr::render;

fn main() -> Result<(), Box<dyn Error>> {
    // Weights found by a previous minimum-variance run; C2 and C4 are numerically zero.
    let weights = vec![
        0.11962057827825744,
        2.30103264816861e-06,
        0.2814317889490023,
        2.6672503869561893e-08,
        0.5989453050675883
    ];
    let alloc = Allocation::new(None, weights, Some(0.004461277407178562))?;
    for (label, share) in alloc.labels.iter().zip(alloc.shares()) {
        println!("{} {:.2}%", label, share);
    }
    render::write_svg("allocation.svg", &render::allocation_chart(&alloc)?)?;
    Ok(())
}
