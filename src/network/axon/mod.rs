use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_time_constant, ConfigError};
use crate::euler::euler_step;
use crate::network::{DendriteId, TimeStep};

/// reversal potential (mV) of an excitatory synapse. Only axons having exactly
/// this reversal potential are subject to plasticity.
pub const EXCITATORY_REVERSAL_POTENTIAL: f64 = 0.0;

/// canonical reversal potential (mV) of an inhibitory synapse
pub const INHIBITORY_REVERSAL_POTENTIAL: f64 = -70.0;

/// includes all configurable parameters for an Axon, except for the way it
/// generates spikes (see SpikeSource)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxonParameters {
    pub reversal_potential: f64, // (mV) E == 0 marks an excitatory synapse, anything else inhibitory
    pub boost: f64,              // conductance increment per spike (initial synaptic weight)
    pub g_max: f64,              // upper bound for boost
    pub g_min: f64,              // lower bound for boost
    pub tau: f64,                // (ms) decay time constant of the conductance
    pub a_plus: f64,             // eligibility trace increment per presynaptic spike
    pub tau_plus: f64,           // (ms) decay time constant of the eligibility trace
}

impl Default for AxonParameters {
    fn default() -> Self {
        Self {
            reversal_potential: EXCITATORY_REVERSAL_POTENTIAL,
            boost: 0.015,
            g_max: 0.015,
            g_min: 0.0,
            tau: 5.0,       //ms
            a_plus: 0.005,
            tau_plus: 20.0, //ms
        }
    }
}

impl AxonParameters {
    /// default parameters for an excitatory synapse
    pub fn excitatory() -> Self {
        Self::default()
    }

    /// default parameters for an inhibitory synapse
    pub fn inhibitory() -> Self {
        Self {
            reversal_potential: INHIBITORY_REVERSAL_POTENTIAL,
            ..Self::default()
        }
    }

    /// set both the initial boost and its upper bound
    pub fn with_weight(mut self, boost: f64, g_max: f64) -> Self {
        self.boost = boost;
        self.g_max = g_max;
        self
    }

    pub fn is_excitatory(&self) -> bool {
        self.reversal_potential == EXCITATORY_REVERSAL_POTENTIAL
    }

    /// check every precondition on the parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("reversal_potential", self.reversal_potential)?;
        check_finite("a_plus", self.a_plus)?;
        check_time_constant("tau", self.tau)?;
        check_time_constant("tau_plus", self.tau_plus)?;

        if !(self.g_min.is_finite() && self.g_max.is_finite())
            || self.g_min < 0.0
            || self.g_min > self.g_max
        {
            return Err(ConfigError::InvalidBounds {
                g_min: self.g_min,
                g_max: self.g_max,
            });
        }
        if !(self.g_min..=self.g_max).contains(&self.boost) {
            return Err(ConfigError::BoostOutOfBounds {
                boost: self.boost,
                g_min: self.g_min,
                g_max: self.g_max,
            });
        }
        Ok(())
    }
}

/// The SpikeSource decides, at each time step, whether an Axon fires.
/// It is chosen once, when the Axon is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpikeSource {
    /// the axon fires with the given probability at every time step
    Bernoulli(f64),
    /// the axon fires exactly at the listed time step indices
    Schedule(BTreeSet<u64>),
}

impl SpikeSource {
    /// build a schedule from any collection of time step indices
    pub fn schedule<I: IntoIterator<Item = u64>>(steps: I) -> Self {
        SpikeSource::Schedule(steps.into_iter().collect())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SpikeSource::Bernoulli(p) if !(0.0..=1.0).contains(p) => {
                Err(ConfigError::InvalidProbability(*p))
            }
            _ => Ok(()),
        }
    }
}

/// The Axon struct represents a presynaptic terminal feeding one Dendrite.
///
/// Each spike raises the synaptic conductance `g` by `boost`; between spikes
/// `g` decays exponentially to zero. For excitatory axons `boost` is the
/// plastic variable: it is rewarded when the dendrite fires shortly after the
/// axon (through the eligibility trace `P`) and penalized when the axon fires
/// shortly after the dendrite (through the dendrite's penalization trace).
#[derive(Clone, Debug)]
pub struct Axon {
    parameters: AxonParameters,
    spike_source: SpikeSource,
    boost: f64,                    // current synaptic weight, always within [g_min, g_max]
    g: f64,                        // synaptic conductance
    eligibility_trace: f64,        // P: how recently this axon fired
    spiked: bool,                  // whether the axon fired during the last step
    dendrite: Option<DendriteId>,  // dendrite this axon is attached to (not owned)
}

impl Axon {
    /// construct a new Axon; fails if any parameter violates its precondition
    pub fn new(spike_source: SpikeSource, parameters: AxonParameters) -> Result<Self, ConfigError> {
        spike_source.validate()?;
        parameters.validate()?;

        Ok(Axon {
            boost: parameters.boost,
            parameters,
            spike_source,
            g: 0.0,
            eligibility_trace: 0.0,
            spiked: false,
            dendrite: None,
        })
    }

    /// construct an Axon firing with probability `p` at each step, with default
    /// parameters and the given reversal potential
    pub fn with_probability(p: f64, reversal_potential: f64) -> Result<Self, ConfigError> {
        Self::new(
            SpikeSource::Bernoulli(p),
            AxonParameters {
                reversal_potential,
                ..AxonParameters::default()
            },
        )
    }

    pub fn parameters(&self) -> &AxonParameters {
        &self.parameters
    }

    pub fn spike_source(&self) -> &SpikeSource {
        &self.spike_source
    }

    pub fn is_excitatory(&self) -> bool {
        self.parameters.is_excitatory()
    }

    /// get the current synaptic weight
    pub fn boost(&self) -> f64 {
        self.boost
    }

    /// get the current weight normalized by its upper bound
    pub fn boost_ratio(&self) -> f64 {
        if self.parameters.g_max > 0.0 {
            self.boost / self.parameters.g_max
        } else {
            0.0
        }
    }

    pub fn conductance(&self) -> f64 {
        self.g
    }

    pub fn eligibility_trace(&self) -> f64 {
        self.eligibility_trace
    }

    pub fn spiked(&self) -> bool {
        self.spiked
    }

    /// get the dendrite the axon is attached to, if any
    pub fn dendrite(&self) -> Option<DendriteId> {
        self.dendrite
    }

    /// record the dendrite this axon feeds. The back-reference can only be set once.
    pub(crate) fn attach(&mut self, index: usize, dendrite: DendriteId) -> Result<(), ConfigError> {
        if let Some(current) = self.dendrite {
            return Err(ConfigError::AxonAlreadyAttached {
                index,
                dendrite: current,
            });
        }
        self.dendrite = Some(dendrite);
        Ok(())
    }

    /// overwrite the weight, e.g. when restoring a saved network. Values
    /// outside [g_min, g_max] are rejected as at construction.
    pub(crate) fn restore_boost(&mut self, boost: f64) -> Result<(), ConfigError> {
        let p = &self.parameters;
        if !(p.g_min..=p.g_max).contains(&boost) {
            return Err(ConfigError::BoostOutOfBounds {
                boost,
                g_min: p.g_min,
                g_max: p.g_max,
            });
        }
        self.boost = boost;
        Ok(())
    }

    /// advance the Axon by one time step and return whether it fired.
    ///
    /// `penalization_trace` is the value of M of the attached dendrite at the
    /// beginning of the time step; it is used to penalize excitatory axons
    /// which fire out of sync with the dendrite. A uniform draw is consumed
    /// from `rng` only when the spike source is Bernoulli.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        time_step: TimeStep,
        penalization_trace: f64,
        rng: &mut R,
    ) -> bool {
        let p = self.parameters;

        self.spiked = match &self.spike_source {
            SpikeSource::Bernoulli(probability) => rng.gen::<f64>() < *probability,
            SpikeSource::Schedule(steps) => steps.contains(&time_step.index),
        };

        // conductance: jump on spike (penalizing before the decay), then decay
        if self.spiked {
            self.g += self.boost;
            if p.is_excitatory() {
                self.penalize(penalization_trace);
            }
        }
        self.g = euler_step(self.g, 0.0, p.tau, time_step.dt);

        // eligibility trace
        if self.spiked {
            self.eligibility_trace += p.a_plus;
        } else {
            self.eligibility_trace = euler_step(self.eligibility_trace, 0.0, p.tau_plus, time_step.dt);
        }

        self.spiked
    }

    /// reward the synapse after a postsynaptic spike, proportionally to how
    /// recently the axon fired. Inhibitory axons are left untouched.
    pub fn reward(&mut self) {
        if !self.is_excitatory() {
            return;
        }
        let p = &self.parameters;
        self.boost = (self.boost + self.eligibility_trace * p.g_max).clamp(p.g_min, p.g_max);
    }

    /// penalize the synapse using the (non-positive) penalization trace of the
    /// dendrite. Inhibitory axons are left untouched.
    pub fn penalize(&mut self, penalization_trace: f64) {
        if !self.is_excitatory() {
            return;
        }
        let p = &self.parameters;
        self.boost = (self.boost + penalization_trace * p.g_max).clamp(p.g_min, p.g_max);
    }

    /// bring conductance and eligibility trace back to rest, as after a long
    /// silent period. The weight is kept.
    pub fn reset_transients(&mut self) {
        self.g = 0.0;
        self.eligibility_trace = 0.0;
        self.spiked = false;
    }
}
