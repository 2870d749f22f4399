use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SnnError, SnnResult};
use crate::experiment::{
    excitatory_boost_ratios, run_until, spike_probability, warn_if_coarse, Histogram,
    StoppingCriterion,
};
use crate::network::axon::{Axon, AxonParameters, SpikeSource};
use crate::network::dendrite::DendriteParameters;
use crate::network::{DendriteId, Network};

/// Configuration of a firing rate sweep: for each excitatory rate, a neuron
/// receiving `excitatory_count` excitatory and `inhibitory_count` inhibitory
/// Poisson inputs is simulated until the stopping criterion is met.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub dt_ms: f64,
    pub seed: u64,
    pub excitatory_count: usize,
    pub excitatory_rates_hz: Vec<f64>,
    pub excitatory: AxonParameters,
    pub inhibitory_count: usize,
    pub inhibitory_rate_hz: f64,
    pub inhibitory: AxonParameters,
    pub dendrite: DendriteParameters,
    pub stopping: StoppingCriterion,
    pub histogram_bins: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            dt_ms: 0.1,
            seed: 0,
            excitatory_count: 1000,
            excitatory_rates_hz: vec![10.0, 15.0, 20.0, 25.0, 30.0, 35.0],
            excitatory: AxonParameters::excitatory(),
            inhibitory_count: 200,
            inhibitory_rate_hz: 10.0,
            inhibitory: AxonParameters::inhibitory().with_weight(0.05, 0.05),
            dendrite: DendriteParameters::default(),
            stopping: StoppingCriterion::Convergence {
                check_every_ms: 1000.0,
                tolerance: 0.01,
                max_duration_ms: 100_000.0,
            },
            histogram_bins: 20,
        }
    }
}

/// Result of a single point of the sweep
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub excitatory_rate_hz: f64,
    pub seed: u64,
    pub duration_ms: f64,
    pub postsynaptic_spikes: usize,
    pub firing_rate_hz: f64,
    pub converged: bool,
    pub boost_ratios: Vec<f64>, // final boost / g_max of every excitatory axon
    pub histogram: Histogram,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub points: Vec<SweepPoint>,
}

impl SweepResult {
    pub fn print(&self) {
        println!("Postsynaptic firing rate");
        for point in &self.points {
            println!(
                "{:6.1} Hz in -> {:7.2} Hz out ({} spikes in {:.0} ms{})",
                point.excitatory_rate_hz,
                point.firing_rate_hz,
                point.postsynaptic_spikes,
                point.duration_ms,
                if point.converged { ", converged" } else { "" }
            );
        }

        for point in &self.points {
            println!("\nboost / g_max at {} Hz", point.excitatory_rate_hz);
            print!("{}", point.histogram.render(50));
        }
    }
}

/// build the network of one sweep point: inhibitory axons first, then excitatory ones
fn build_network(config: &SweepConfig, excitatory_rate_hz: f64) -> SnnResult<Network> {
    let mut axons = Vec::with_capacity(config.inhibitory_count + config.excitatory_count);

    let p_inh = spike_probability(config.inhibitory_rate_hz, config.dt_ms);
    for _ in 0..config.inhibitory_count {
        axons.push(Axon::new(SpikeSource::Bernoulli(p_inh), config.inhibitory)?);
    }
    let p_exc = spike_probability(excitatory_rate_hz, config.dt_ms);
    for _ in 0..config.excitatory_count {
        axons.push(Axon::new(SpikeSource::Bernoulli(p_exc), config.excitatory)?);
    }

    let mut network = Network::new(config.dt_ms)?;
    network.add_dendrite(axons, config.dendrite)?;
    Ok(network)
}

/// Simulate a single excitatory rate with the given seed
pub fn run_point(config: &SweepConfig, excitatory_rate_hz: f64, seed: u64) -> SnnResult<SweepPoint> {
    let mut network = build_network(config, excitatory_rate_hz)?;
    let mut rng = StdRng::seed_from_u64(seed);
    info!(excitatory_rate_hz, seed, "sweep point started");

    let outcome = run_until(&mut network, &config.stopping, &mut rng);

    let duration_ms = outcome.steps as f64 * config.dt_ms;
    let postsynaptic_spikes = outcome.spike_counts.iter().sum();
    let firing_rate_hz = postsynaptic_spikes as f64 / (duration_ms / 1000.0);
    let boost_ratios = excitatory_boost_ratios(network.dendrite(DendriteId(0))?.axons());
    let histogram = Histogram::of_ratios(&boost_ratios, config.histogram_bins);

    info!(
        excitatory_rate_hz,
        firing_rate_hz,
        duration_ms,
        converged = outcome.converged,
        "sweep point finished"
    );
    Ok(SweepPoint {
        excitatory_rate_hz,
        seed,
        duration_ms,
        postsynaptic_spikes,
        firing_rate_hz,
        converged: outcome.converged,
        boost_ratios,
        histogram,
    })
}

/// Run every point of the sweep, each one in its own thread. Points are
/// independent (disjoint networks, one random generator each, seeded with
/// `config.seed + point index`), so the result does not depend on scheduling.
pub fn run_sweep(config: &SweepConfig) -> SnnResult<SweepResult> {
    warn_if_coarse(config.dt_ms, &[config.excitatory, config.inhibitory], &config.dendrite);

    // Create a Vec to hold thread handles
    let mut thread_handles = Vec::<(String, JoinHandle<SnnResult<SweepPoint>>)>::new();

    for (index, &rate) in config.excitatory_rates_hz.iter().enumerate() {
        let name = format!("rate {} Hz", rate);
        let point_config = config.clone();
        let seed = config.seed.wrapping_add(index as u64);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_point(&point_config, rate, seed))?;
        thread_handles.push((name, handle));
    }

    // Await termination of all spawned threads, keeping the order of the rates
    let mut points = Vec::with_capacity(thread_handles.len());
    for (name, handle) in thread_handles {
        let point = handle.join().map_err(|_| SnnError::WorkerPanicked(name))??;
        points.push(point);
    }

    Ok(SweepResult { points })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SweepConfig {
        SweepConfig {
            excitatory_count: 50,
            excitatory_rates_hz: vec![10.0, 40.0],
            inhibitory_count: 10,
            stopping: StoppingCriterion::Duration { duration_ms: 200.0 },
            ..SweepConfig::default()
        }
    }

    #[test]
    fn network_layout() {
        let config = small_config();
        let network = build_network(&config, 20.0).unwrap();
        let axons = network.dendrites()[0].axons();
        assert_eq!(axons.len(), 60);
        assert!(axons[..10].iter().all(|axon| !axon.is_excitatory()));
        assert!(axons[10..].iter().all(|axon| axon.is_excitatory()));
        assert_eq!(axons[10].spike_source(), &SpikeSource::Bernoulli(spike_probability(20.0, 0.1)));
    }

    #[test]
    fn point_reports_consistent_statistics() {
        let config = small_config();
        let point = run_point(&config, 40.0, 3).unwrap();
        assert!((point.duration_ms - 200.0).abs() < 1e-9);
        assert_eq!(point.boost_ratios.len(), 50);
        assert_eq!(point.histogram.total(), 50);
        assert!(point.boost_ratios.iter().all(|r| (0.0..=1.0).contains(r)));
        assert!((point.firing_rate_hz - point.postsynaptic_spikes as f64 * 5.0).abs() < 1e-9);
    }

    #[test]
    fn sweep_is_reproducible() {
        let config = small_config();
        let first = run_sweep(&config).unwrap();
        let second = run_sweep(&config).unwrap();
        assert_eq!(first.points.len(), 2);
        assert_eq!(first.points[0].excitatory_rate_hz, 10.0);
        assert_eq!(first.points[1].seed, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_rate_is_reported() {
        let config = SweepConfig {
            excitatory_rates_hz: vec![20_000.0],
            ..small_config()
        };
        assert!(matches!(run_sweep(&config), Err(SnnError::Config(_))));
    }
}
