use rand::rngs::StdRng;
use rand::SeedableRng;
use snn_stdp::network::json;
use snn_stdp::{Axon, DendriteParameters, Network};

/// Attach 5 excitatory and 5 inhibitory axons (spiking with probability 0.1
/// at each step) to a dendrite and print how voltage, penalization trace,
/// eligibility trace and weight of the first axon evolve.
/// If a path is given as first argument, the final network is saved there.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut axons = Vec::new();
    for _ in 0..5 {
        axons.push(Axon::with_probability(0.1, 0.0)?);
    }
    for _ in 0..5 {
        axons.push(Axon::with_probability(0.1, -70.0)?);
    }

    let mut network = Network::new(0.1)?;
    let id = network.add_dendrite(axons, DendriteParameters::default())?;
    let mut rng = StdRng::seed_from_u64(42);

    println!("{:>8} {:>9} {:>10} {:>9} {:>9} {:>9}", "t (ms)", "V (mV)", "M", "g[0]", "P[0]", "boost[0]");
    for step in 0..2000 {
        network.step(&mut rng);
        let dendrite = network.dendrite(id)?;
        let first = &dendrite.axons()[0];
        if dendrite.spiked() || step % 100 == 0 {
            println!(
                "{:8.1} {:9.3} {:10.6} {:9.5} {:9.5} {:9.6}{}",
                network.elapsed_ms(),
                dendrite.v_mem(),
                dendrite.penalization_trace(),
                first.conductance(),
                first.eligibility_trace(),
                first.boost(),
                if dendrite.spiked() { "  <- spike" } else { "" }
            );
        }
    }

    if let Some(path) = std::env::args().nth(1) {
        json::save_to_file(&network, &path)?;
        println!("network saved to {}", path);
    }
    Ok(())
}
