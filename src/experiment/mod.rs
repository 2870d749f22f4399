/* The experiment module contains the drivers built on top of the network:
- stopping criteria (fixed duration or convergence of the synaptic weights)
- a histogram of the normalized weights
- the firing rate sweep (sweep) and the burst/latency experiment (burst).

Drivers receive an explicit configuration struct and a seed: nothing here
keeps global state, so independent runs can be executed in parallel. */

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::network::axon::{Axon, AxonParameters};
use crate::network::dendrite::DendriteParameters;
use crate::network::Network;

pub mod burst;
pub mod sweep;

/// Decide when a run is over
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoppingCriterion {
    /// simulate a fixed amount of time
    Duration { duration_ms: f64 },
    /// every `check_every_ms`, compare each excitatory weight (normalized by
    /// g_max) with the previous check; stop when none moved more than
    /// `tolerance`, or after `max_duration_ms` anyway
    Convergence {
        check_every_ms: f64,
        tolerance: f64,
        max_duration_ms: f64,
    },
}

/// What happened during a run
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    pub steps: u64,
    pub spike_counts: Vec<usize>, // postsynaptic spikes per dendrite
    pub converged: bool,          // always false for StoppingCriterion::Duration
}

/// Compare snapshots of the normalized weights taken at successive checkpoints
#[derive(Clone, Debug)]
pub struct ConvergenceMonitor {
    tolerance: f64,
    previous: Option<Vec<f64>>,
}

impl ConvergenceMonitor {
    pub fn new(tolerance: f64) -> Self {
        ConvergenceMonitor {
            tolerance,
            previous: None,
        }
    }

    /// Record a new snapshot and return true if no value changed by more than
    /// the tolerance since the previous one. The first snapshot never converges.
    pub fn check(&mut self, snapshot: Vec<f64>) -> bool {
        let converged = match &self.previous {
            Some(previous) if previous.len() == snapshot.len() => previous
                .iter()
                .zip(snapshot.iter())
                .all(|(before, after)| (after - before).abs() <= self.tolerance),
            _ => false,
        };
        self.previous = Some(snapshot);
        converged
    }
}

/// normalized weights (boost / g_max) of the excitatory axons, in order
pub fn excitatory_boost_ratios<'a, I>(axons: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Axon>,
{
    axons
        .into_iter()
        .filter(|axon| axon.is_excitatory())
        .map(Axon::boost_ratio)
        .collect()
}

fn network_boost_ratios(network: &Network) -> Vec<f64> {
    network
        .dendrites()
        .iter()
        .flat_map(|dendrite| excitatory_boost_ratios(dendrite.axons()))
        .collect()
}

/// number of steps covering `duration_ms` (at least one)
pub fn steps_for(duration_ms: f64, dt: f64) -> u64 {
    ((duration_ms / dt).round() as u64).max(1)
}

/// per-step spike probability of a Poisson process firing at `rate_hz`
pub fn spike_probability(rate_hz: f64, dt_ms: f64) -> f64 {
    rate_hz * dt_ms / 1000.0
}

/// Run the network until the stopping criterion is met
pub fn run_until<R: Rng + ?Sized>(
    network: &mut Network,
    stopping: &StoppingCriterion,
    rng: &mut R,
) -> RunOutcome {
    let dt = network.dt();
    match *stopping {
        StoppingCriterion::Duration { duration_ms } => {
            let steps = steps_for(duration_ms, dt);
            let spike_counts = network.run(steps, rng);
            RunOutcome {
                steps,
                spike_counts,
                converged: false,
            }
        }
        StoppingCriterion::Convergence {
            check_every_ms,
            tolerance,
            max_duration_ms,
        } => {
            let check_every = steps_for(check_every_ms, dt);
            let max_steps = steps_for(max_duration_ms, dt);
            let mut monitor = ConvergenceMonitor::new(tolerance);
            monitor.check(network_boost_ratios(network));

            let mut steps = 0;
            let mut spike_counts = vec![0; network.dendrites().len()];
            let mut converged = false;
            while steps < max_steps {
                let chunk = check_every.min(max_steps - steps);
                for (total, count) in spike_counts.iter_mut().zip(network.run(chunk, rng)) {
                    *total += count;
                }
                steps += chunk;

                converged = monitor.check(network_boost_ratios(network));
                debug!(
                    elapsed_ms = network.elapsed_ms(),
                    converged,
                    "weight convergence check"
                );
                if converged {
                    break;
                }
            }
            RunOutcome {
                steps,
                spike_counts,
                converged,
            }
        }
    }
}

/// Explicit Euler integration is only reliable when the step is much shorter
/// than every time constant: log a warning otherwise.
pub(crate) fn warn_if_coarse(dt: f64, axons: &[AxonParameters], dendrite: &DendriteParameters) {
    let fastest = axons
        .iter()
        .flat_map(|p| [p.tau, p.tau_plus])
        .chain([dendrite.tau, dendrite.tau_minus])
        .fold(f64::INFINITY, f64::min);
    if dt > fastest / 10.0 {
        warn!(
            dt_ms = dt,
            fastest_time_constant_ms = fastest,
            "time step is coarse compared to the fastest time constant, Euler integration may be inaccurate"
        );
    }
}

/// Histogram of values over a closed interval split in equal bins
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub lower: f64,
    pub upper: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Count `values` into `bins` equal bins over [lower, upper]. Values equal
    /// to `upper` fall in the last bin; values outside the range are clamped
    /// into the first or last bin.
    pub fn new(values: &[f64], bins: usize, lower: f64, upper: f64) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0; bins];
        let width = (upper - lower) / bins as f64;
        for value in values {
            let index = if width > 0.0 {
                ((value - lower) / width).floor().max(0.0) as usize
            } else {
                0
            };
            counts[index.min(bins - 1)] += 1;
        }
        Histogram {
            lower,
            upper,
            counts,
        }
    }

    /// histogram of normalized weights, over [0, 1]
    pub fn of_ratios(ratios: &[f64], bins: usize) -> Self {
        Self::new(ratios, bins, 0.0, 1.0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// text rendering, one line per bin, bars scaled to `width` characters
    pub fn render(&self, width: usize) -> String {
        let max = self.counts.iter().copied().max().unwrap_or(0).max(1);
        let bin_width = (self.upper - self.lower) / self.counts.len() as f64;
        self.counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let from = self.lower + i as f64 * bin_width;
                let bar = "#".repeat(count * width / max);
                format!("[{:5.2}, {:5.2}) {:6} {}\n", from, from + bin_width, count, bar)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::axon::SpikeSource;
    use std::collections::BTreeSet;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn histogram_bins_edges() {
        let histogram = Histogram::of_ratios(&[0.0, 0.04, 0.05, 0.52, 0.99, 1.0, 1.3, -0.2], 20);
        assert_eq!(histogram.counts.len(), 20);
        assert_eq!(histogram.total(), 8);
        assert_eq!(histogram.counts[0], 3);
        assert_eq!(histogram.counts[1], 1);
        assert_eq!(histogram.counts[10], 1);
        assert_eq!(histogram.counts[19], 3);
    }

    #[test]
    fn histogram_render_has_one_line_per_bin() {
        let histogram = Histogram::of_ratios(&[0.1, 0.1, 0.9], 4);
        let text = histogram.render(10);
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().next().unwrap().ends_with("##########"));
        assert_eq!(text.lines().nth(3), Some("[ 0.75,  1.00)      1 #####"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn convergence_monitor_needs_two_close_snapshots() {
        let mut monitor = ConvergenceMonitor::new(0.01);
        assert!(!monitor.check(vec![0.5, 0.5]));
        assert!(!monitor.check(vec![0.5, 0.6]));
        assert!(monitor.check(vec![0.505, 0.6]));
        assert!(!monitor.check(vec![0.505]));
    }

    #[test]
    fn duration_criterion_runs_exact_number_of_steps() {
        let mut network = Network::new(0.1).unwrap();
        network
            .add_dendrite(
                vec![Axon::with_probability(0.01, 0.0).unwrap()],
                DendriteParameters::default(),
            )
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = run_until(
            &mut network,
            &StoppingCriterion::Duration { duration_ms: 25.0 },
            &mut rng,
        );
        assert_eq!(outcome.steps, 250);
        assert_eq!(network.current_step(), 250);
        assert!(!outcome.converged);
    }

    #[test]
    fn silent_network_converges_at_second_check() {
        let mut network = Network::new(0.1).unwrap();
        let silent = Axon::new(SpikeSource::Schedule(BTreeSet::new()), AxonParameters::default()).unwrap();
        network
            .add_dendrite(vec![silent], DendriteParameters::default())
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = run_until(
            &mut network,
            &StoppingCriterion::Convergence {
                check_every_ms: 10.0,
                tolerance: 1e-9,
                max_duration_ms: 1000.0,
            },
            &mut rng,
        );
        assert!(outcome.converged);
        assert_eq!(outcome.steps, 100);
        assert_eq!(outcome.spike_counts, vec![0]);
    }

    #[test]
    fn convergence_criterion_is_bounded() {
        let mut network = Network::new(0.1).unwrap();
        let axons = (0..20)
            .map(|_| Axon::with_probability(0.05, 0.0).unwrap())
            .collect();
        network
            .add_dendrite(axons, DendriteParameters::default())
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = run_until(
            &mut network,
            &StoppingCriterion::Convergence {
                check_every_ms: 7.0,
                tolerance: 0.0,
                max_duration_ms: 50.0,
            },
            &mut rng,
        );
        assert!(outcome.steps <= 500);
        assert_eq!(network.current_step(), outcome.steps);
    }

    #[test]
    fn spike_probability_from_rate() {
        assert!((spike_probability(10.0, 0.1) - 0.001).abs() < 1e-15);
        assert!((spike_probability(100.0, 0.5) - 0.05).abs() < 1e-15);
    }
}
