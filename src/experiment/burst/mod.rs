use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{check_duration, check_finite, ConfigError, SnnResult};
use crate::experiment::{excitatory_boost_ratios, spike_probability, steps_for, warn_if_coarse, ConvergenceMonitor};
use crate::network::axon::{Axon, AxonParameters, SpikeSource};
use crate::network::dendrite::DendriteParameters;
use crate::network::{DendriteId, Network};

/// Configuration of the burst/latency experiment.
///
/// Inputs are silent except for bursts of spikes (Poisson at `burst_rate_hz`
/// for `burst_duration_ms`) starting every `event_period_ms`, shifted by
/// `event_onset_ms`. Each axon receives the bursts with its own latency,
/// drawn once from a Gaussian with mean 0 and standard deviation
/// `latency_sd_ms`. The same trial is repeated until the weights stop moving.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstConfig {
    pub dt_ms: f64,
    pub seed: u64,
    pub trial_duration_ms: f64,
    pub event_period_ms: f64,
    pub event_onset_ms: f64,
    pub burst_duration_ms: f64,
    pub burst_rate_hz: f64,
    pub latency_sd_ms: f64,
    pub excitatory_count: usize,
    pub inhibitory_count: usize,
    pub excitatory: AxonParameters,
    pub inhibitory: AxonParameters,
    pub dendrite: DendriteParameters,
    pub steady_state_tolerance: f64, // max change of boost / g_max between two trials
    pub max_trials: usize,
}

impl Default for BurstConfig {
    fn default() -> Self {
        BurstConfig {
            dt_ms: 0.5,
            seed: 0,
            trial_duration_ms: 80.0,
            event_period_ms: 100.0,
            event_onset_ms: 30.0,
            burst_duration_ms: 20.0,
            burst_rate_hz: 100.0,
            latency_sd_ms: 15.0,
            excitatory_count: 120,
            inhibitory_count: 20,
            excitatory: AxonParameters::excitatory().with_weight(0.004, 0.02),
            inhibitory: AxonParameters::inhibitory().with_weight(0.004, 0.02),
            dendrite: DendriteParameters::default(),
            steady_state_tolerance: 5e-6,
            max_trials: 10_000,
        }
    }
}

impl BurstConfig {
    /// check the timing of the trials and of the bursts before any schedule is
    /// built from them
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt_ms.is_finite() && self.dt_ms > 0.0) {
            return Err(ConfigError::InvalidTimeStep(self.dt_ms));
        }
        check_duration("trial_duration_ms", self.trial_duration_ms)?;
        check_duration("event_period_ms", self.event_period_ms)?;
        check_duration("burst_duration_ms", self.burst_duration_ms)?;
        check_finite("event_onset_ms", self.event_onset_ms)?;
        check_finite("burst_rate_hz", self.burst_rate_hz)?;
        if !(self.latency_sd_ms.is_finite() && self.latency_sd_ms >= 0.0) {
            return Err(ConfigError::InvalidLatencySpread(self.latency_sd_ms));
        }
        Ok(())
    }
}

/// Precomputed spikes of one axon
#[derive(Clone, Debug, PartialEq)]
pub struct BurstSchedule {
    pub latency_ms: f64,
    pub steps: BTreeSet<u64>,
}

/// Draw a latency for each of `count` axons and precompute the time steps at
/// which each of them fires during a trial. Steps falling before the start
/// of the trial (negative latencies) are dropped.
pub fn generate_schedules<R: Rng + ?Sized>(
    config: &BurstConfig,
    count: usize,
    rng: &mut R,
) -> SnnResult<Vec<BurstSchedule>> {
    config.validate()?;
    let latency = Normal::new(0.0, config.latency_sd_ms)
        .map_err(|_| ConfigError::InvalidLatencySpread(config.latency_sd_ms))?;
    let dt = config.dt_ms;
    let events = (config.trial_duration_ms / config.event_period_ms).floor() as u64 + 1;
    let burst_steps = steps_for(config.burst_duration_ms, dt);
    let p_spike = spike_probability(config.burst_rate_hz, dt);

    let mut schedules = Vec::with_capacity(count);
    for _ in 0..count {
        let latency_ms: f64 = latency.sample(rng);
        let latency_steps = (latency_ms / dt).round() as i64;
        let mut steps = BTreeSet::new();

        for event in 0..events {
            let start_ms = event as f64 * config.event_period_ms + config.event_onset_ms;
            let first_step = (start_ms / dt).round() as i64 + latency_steps;
            for k in 0..burst_steps as i64 {
                if rng.gen::<f64>() < p_spike && first_step + k >= 0 {
                    steps.insert((first_step + k) as u64);
                }
            }
        }
        schedules.push(BurstSchedule { latency_ms, steps });
    }
    Ok(schedules)
}

/// Membrane potential and input activity recorded during one trial
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialTrace {
    pub time_ms: Vec<f64>,
    pub v_mem: Vec<f64>,
    pub input_active: Vec<bool>, // whether any axon fired at that step
    pub postsynaptic_spikes: usize,
}

/// mean normalized weight of the excitatory axons sharing the same latency
/// (rounded to the ms)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatencyBin {
    pub latency_ms: i64,
    pub axons: usize,
    pub mean_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BurstResult {
    pub trials: usize,
    pub steady_state: bool,
    pub latencies_ms: Vec<f64>,    // latency of every excitatory axon
    pub initial_ratios: Vec<f64>,  // boost / g_max of every excitatory axon, before the first trial
    pub final_ratios: Vec<f64>,
    pub initial_profile: Vec<LatencyBin>,
    pub final_profile: Vec<LatencyBin>,
    pub first_trial: TrialTrace,
    pub last_trial: TrialTrace,
}

impl BurstResult {
    pub fn print(&self) {
        println!(
            "{} trials, {}",
            self.trials,
            if self.steady_state { "steady state reached" } else { "steady state NOT reached" }
        );
        println!(
            "postsynaptic spikes: first trial {}, last trial {}",
            self.first_trial.postsynaptic_spikes, self.last_trial.postsynaptic_spikes
        );
        println!("\nlatency (ms)  axons  boost/g_max before -> after");
        for (before, after) in self.initial_profile.iter().zip(self.final_profile.iter()) {
            println!(
                "{:12}  {:5}  {:.3} -> {:.3}",
                after.latency_ms, after.axons, before.mean_ratio, after.mean_ratio
            );
        }
    }
}

pub fn latency_profile(latencies_ms: &[f64], ratios: &[f64]) -> Vec<LatencyBin> {
    let mut bins = BTreeMap::<i64, (usize, f64)>::new();
    for (latency, ratio) in latencies_ms.iter().zip(ratios.iter()) {
        let bin = bins.entry(latency.round() as i64).or_insert((0, 0.0));
        bin.0 += 1;
        bin.1 += ratio;
    }
    bins.into_iter()
        .map(|(latency_ms, (axons, sum))| LatencyBin {
            latency_ms,
            axons,
            mean_ratio: sum / axons as f64,
        })
        .collect()
}

/// Run a single trial from rest, recording the membrane potential
fn run_trial<R: Rng + ?Sized>(network: &mut Network, steps: u64, rng: &mut R) -> SnnResult<TrialTrace> {
    network.restart_trial();
    let mut trace = TrialTrace::default();
    for _ in 0..steps {
        let time_ms = network.elapsed_ms();
        network.step(rng);
        let dendrite = network.dendrite(DendriteId(0))?;
        trace.time_ms.push(time_ms);
        trace.v_mem.push(dendrite.v_mem());
        trace.input_active.push(dendrite.axons().iter().any(Axon::spiked));
        if dendrite.spiked() {
            trace.postsynaptic_spikes += 1;
        }
    }
    Ok(trace)
}

/// Repeat the same burst trial until no excitatory weight changes by more
/// than `steady_state_tolerance` from one trial to the next
pub fn run_burst_experiment(config: &BurstConfig) -> SnnResult<BurstResult> {
    config.validate()?;
    warn_if_coarse(config.dt_ms, &[config.excitatory, config.inhibitory], &config.dendrite);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let total = config.excitatory_count + config.inhibitory_count;
    let schedules = generate_schedules(config, total, &mut rng)?;
    let latencies_ms: Vec<f64> = schedules[..config.excitatory_count]
        .iter()
        .map(|schedule| schedule.latency_ms)
        .collect();

    let mut axons = Vec::with_capacity(total);
    for (index, schedule) in schedules.into_iter().enumerate() {
        let parameters = if index < config.excitatory_count {
            config.excitatory
        } else {
            config.inhibitory
        };
        axons.push(Axon::new(SpikeSource::Schedule(schedule.steps), parameters)?);
    }
    let mut network = Network::new(config.dt_ms)?;
    let id = network.add_dendrite(axons, config.dendrite)?;

    let ratios = |network: &Network| -> SnnResult<Vec<f64>> {
        Ok(excitatory_boost_ratios(network.dendrite(id)?.axons()))
    };
    let initial_ratios = ratios(&network)?;
    let mut monitor = ConvergenceMonitor::new(config.steady_state_tolerance);
    monitor.check(initial_ratios.clone());

    let steps = steps_for(config.trial_duration_ms, config.dt_ms);
    info!(axons = total, steps, "burst experiment started");

    let mut first_trial = None;
    let mut last_trial = TrialTrace::default();
    let mut trials = 0;
    let mut steady_state = false;
    while trials < config.max_trials {
        let trace = run_trial(&mut network, steps, &mut rng)?;
        trials += 1;
        if first_trial.is_none() {
            first_trial = Some(trace.clone());
        }
        last_trial = trace;

        steady_state = monitor.check(ratios(&network)?);
        debug!(trial = trials, steady_state, "burst trial finished");
        if steady_state {
            break;
        }
    }
    info!(trials, steady_state, "burst experiment finished");

    let final_ratios = ratios(&network)?;
    Ok(BurstResult {
        trials,
        steady_state,
        initial_profile: latency_profile(&latencies_ms, &initial_ratios),
        final_profile: latency_profile(&latencies_ms, &final_ratios),
        latencies_ms,
        initial_ratios,
        final_ratios,
        first_trial: first_trial.unwrap_or_default(),
        last_trial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnnError;

    fn small_config() -> BurstConfig {
        BurstConfig {
            excitatory_count: 30,
            inhibitory_count: 5,
            max_trials: 20,
            ..BurstConfig::default()
        }
    }

    #[test]
    fn schedules_stay_inside_their_burst_window() {
        let config = BurstConfig {
            latency_sd_ms: 0.0,
            ..small_config()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let schedules = generate_schedules(&config, 50, &mut rng).unwrap();
        assert_eq!(schedules.len(), 50);
        // onset at 30 ms, 20 ms burst, 0.5 ms steps => steps 60..100
        for schedule in &schedules {
            assert_eq!(schedule.latency_ms, 0.0);
            assert!(schedule.steps.iter().all(|step| (60..100).contains(step)));
        }
        // 100 Hz over 20 ms: about two spikes per axon
        let spikes: usize = schedules.iter().map(|s| s.steps.len()).sum();
        assert!(spikes > 30 && spikes < 200, "{} spikes", spikes);
    }

    #[test]
    fn latencies_shift_schedules() {
        let config = BurstConfig {
            burst_rate_hz: 2000.0, // p = 1: every step of the burst fires
            ..small_config()
        };
        let mut rng = StdRng::seed_from_u64(8);
        for schedule in generate_schedules(&config, 20, &mut rng).unwrap() {
            let shift = (schedule.latency_ms / 0.5).round() as i64;
            let expected: BTreeSet<u64> = (60..100)
                .map(|step: i64| step + shift)
                .filter(|step| *step >= 0)
                .map(|step| step as u64)
                .collect();
            assert_eq!(schedule.steps, expected);
        }
    }

    #[test]
    fn invalid_latency_spread_is_rejected() {
        let config = BurstConfig {
            latency_sd_ms: -1.0,
            ..small_config()
        };
        assert!(matches!(
            run_burst_experiment(&config),
            Err(SnnError::Config(ConfigError::InvalidLatencySpread(_)))
        ));
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(BurstConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_event_period_is_rejected() {
        let config = BurstConfig {
            event_period_ms: 0.0,
            ..small_config()
        };
        assert!(matches!(
            run_burst_experiment(&config),
            Err(SnnError::Config(ConfigError::InvalidDuration { name: "event_period_ms", .. }))
        ));
    }

    #[test]
    fn invalid_timing_fields_are_rejected() {
        let cases = [
            BurstConfig { dt_ms: 0.0, ..small_config() },
            BurstConfig { dt_ms: f64::NAN, ..small_config() },
            BurstConfig { event_period_ms: -10.0, ..small_config() },
            BurstConfig { event_period_ms: f64::INFINITY, ..small_config() },
            BurstConfig { burst_duration_ms: 0.0, ..small_config() },
            BurstConfig { trial_duration_ms: -1.0, ..small_config() },
            BurstConfig { event_onset_ms: f64::NAN, ..small_config() },
            BurstConfig { latency_sd_ms: f64::INFINITY, ..small_config() },
        ];
        for config in cases.iter() {
            assert!(config.validate().is_err(), "{:?} accepted", config);
            let mut rng = StdRng::seed_from_u64(0);
            assert!(generate_schedules(config, 3, &mut rng).is_err());
        }
        assert_eq!(
            BurstConfig { dt_ms: 0.0, ..small_config() }.validate(),
            Err(ConfigError::InvalidTimeStep(0.0))
        );
        assert_eq!(
            BurstConfig { burst_duration_ms: 0.0, ..small_config() }.validate(),
            Err(ConfigError::InvalidDuration { name: "burst_duration_ms", value: 0.0 })
        );
    }

    #[test]
    fn zero_latency_spread_is_accepted() {
        let config = BurstConfig {
            latency_sd_ms: 0.0,
            ..small_config()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn latency_profile_groups_by_millisecond() {
        let profile = latency_profile(&[-1.2, -0.8, 3.0, 2.6], &[0.2, 0.4, 1.0, 0.0]);
        assert_eq!(profile.len(), 2);
        assert_eq!((profile[0].latency_ms, profile[0].axons), (-1, 2));
        assert!((profile[0].mean_ratio - 0.3).abs() < 1e-12);
        assert_eq!((profile[1].latency_ms, profile[1].axons), (3, 2));
        assert!((profile[1].mean_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn experiment_records_traces_and_keeps_bounds() {
        let config = small_config();
        let result = run_burst_experiment(&config).unwrap();
        assert!(result.trials >= 1 && result.trials <= 20);
        assert_eq!(result.latencies_ms.len(), 30);
        assert_eq!(result.final_ratios.len(), 30);
        assert_eq!(result.first_trial.v_mem.len(), 160);
        assert_eq!(result.last_trial.time_ms.len(), 160);
        assert_eq!(result.first_trial.time_ms[1], 0.5);
        assert!(result.final_ratios.iter().all(|r| (0.0..=1.0).contains(r)));
        assert_eq!(
            result.final_profile.iter().map(|bin| bin.axons).sum::<usize>(),
            30
        );
    }

    #[test]
    fn experiment_is_reproducible() {
        let config = small_config();
        assert_eq!(
            run_burst_experiment(&config).unwrap(),
            run_burst_experiment(&config).unwrap()
        );
    }
}
