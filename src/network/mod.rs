use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SnnError, SnnResult};
use crate::network::axon::Axon;
use crate::network::dendrite::{Dendrite, DendriteParameters};

pub mod axon;
pub mod dendrite;
pub mod json;

/// Identifier of a Dendrite inside a Network. Axons keep it as a non-owning
/// back-reference to the dendrite they feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DendriteId(pub usize);

impl fmt::Display for DendriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The discrete time step being simulated: its index (used by scheduled
/// spike sources) and its duration in ms (used by every Euler step)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeStep {
    pub index: u64,
    pub dt: f64,
}

/// The struct Network collects the Dendrites of a simulation run, each one
/// owning the Axons attached to it, and drives them through discrete time
/// steps of fixed duration.
///
/// Within each time step, for every dendrite:
/// 1. all its axons are stepped, seeing the penalization trace of the
///    dendrite as it was at the beginning of the time step;
/// 2. the dendrite itself is stepped, reading the conductances produced at 1.
///
/// Dendrites never interact with each other, so a Network is just a batch of
/// independent neurons sharing the clock and the random source.
#[derive(Clone, Debug)]
pub struct Network {
    dt: f64,                  // (ms) time step duration
    time_step: u64,           // index of the next time step to simulate
    dendrites: Vec<Dendrite>, // indexed by DendriteId
}

impl Network {
    /// Create an empty network advancing by `dt` ms at every step.
    ///
    /// `dt` should be small compared to the fastest time constant of the
    /// model: explicit Euler integration becomes inaccurate, and eventually
    /// unstable, otherwise. This is not checked.
    pub fn new(dt: f64) -> Result<Self, ConfigError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::InvalidTimeStep(dt));
        }
        Ok(Network {
            dt,
            time_step: 0,
            dendrites: Vec::new(),
        })
    }

    /// Build a new Dendrite from the provided axons and add it to the network
    pub fn add_dendrite(
        &mut self,
        axons: Vec<Axon>,
        parameters: DendriteParameters,
    ) -> Result<DendriteId, ConfigError> {
        let id = DendriteId(self.dendrites.len());
        self.dendrites.push(Dendrite::new(id, axons, parameters)?);
        Ok(id)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// index of the next time step to simulate (number of steps done so far)
    pub fn current_step(&self) -> u64 {
        self.time_step
    }

    /// simulated time in ms
    pub fn elapsed_ms(&self) -> f64 {
        self.time_step as f64 * self.dt
    }

    pub fn dendrites(&self) -> &[Dendrite] {
        &self.dendrites
    }

    pub fn dendrite(&self, id: DendriteId) -> SnnResult<&Dendrite> {
        self.dendrites.get(id.0).ok_or(SnnError::UnknownDendrite(id))
    }

    pub fn dendrite_mut(&mut self, id: DendriteId) -> SnnResult<&mut Dendrite> {
        self.dendrites.get_mut(id.0).ok_or(SnnError::UnknownDendrite(id))
    }

    /// Simulate one time step for every dendrite of the network and return
    /// how many of them fired.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let time_step = TimeStep {
            index: self.time_step,
            dt: self.dt,
        };

        let mut fired = 0;
        for dendrite in self.dendrites.iter_mut() {
            dendrite.step_inputs(time_step, rng);
            if dendrite.step(time_step.dt) {
                fired += 1;
            }
        }

        self.time_step += 1;
        fired
    }

    /// Simulate `steps` consecutive time steps, returning the number of
    /// postsynaptic spikes produced by each dendrite
    pub fn run<R: Rng + ?Sized>(&mut self, steps: u64, rng: &mut R) -> Vec<usize> {
        let mut spike_counts = vec![0; self.dendrites.len()];
        for _ in 0..steps {
            self.step(rng);
            for (count, dendrite) in spike_counts.iter_mut().zip(self.dendrites.iter()) {
                if dendrite.spiked() {
                    *count += 1;
                }
            }
        }
        spike_counts
    }

    /// Restart the clock and bring every decaying variable back to rest,
    /// keeping the synaptic weights. Used to run repeated trials with the
    /// same spike schedules.
    pub fn restart_trial(&mut self) {
        self.time_step = 0;
        for dendrite in self.dendrites.iter_mut() {
            dendrite.reset_transients();
        }
    }
}
