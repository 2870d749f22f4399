use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{check_finite, check_time_constant, ConfigError};
use crate::euler::euler_step;
use crate::network::axon::Axon;
use crate::network::{DendriteId, TimeStep};

///includes all configurable electrical and plasticity parameters for a Dendrite
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DendriteParameters {
    pub v_rest: f64,    //potential at rest (mV)
    pub tau: f64,       //membrane time constant (ms)
    pub v_thr: f64,     //threshold potential (mV)
    pub v_peak: f64,    //potential shown during the action potential (mV)
    pub v_reset: f64,   //reset potential after the action potential (mV)
    pub a_minus: f64,   //decrement of the penalization trace at each postsynaptic spike
    pub tau_minus: f64, //decay time constant of the penalization trace (ms)
}

impl Default for DendriteParameters {
    fn default() -> Self {
        Self {
            v_rest: -70.0,   //mV
            tau: 20.0,       //ms
            v_thr: -54.0,    //mV
            v_peak: 60.0,    //mV
            v_reset: -60.0,  //mV
            a_minus: 0.00525,
            tau_minus: 20.0, //ms
        }
    }
}

impl DendriteParameters {
    /// check every precondition on the parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("v_rest", self.v_rest)?;
        check_finite("v_thr", self.v_thr)?;
        check_finite("v_peak", self.v_peak)?;
        check_finite("v_reset", self.v_reset)?;
        check_finite("a_minus", self.a_minus)?;
        check_time_constant("tau", self.tau)?;
        check_time_constant("tau_minus", self.tau_minus)?;

        if self.v_thr > self.v_peak {
            return Err(ConfigError::ThresholdAbovePeak {
                v_thr: self.v_thr,
                v_peak: self.v_peak,
            });
        }
        Ok(())
    }
}

/// The Dendrite struct represents the postsynaptic leaky integrate-and-fire unit.
///
/// It sums the currents injected by all its Axons: at each step the membrane
/// potential relaxes towards `V_rest + Σ g_i (E_i - V)`. When the threshold is
/// reached the potential is set to `v_peak` for exactly one step, and on the
/// following step it is reset to `v_reset` while every excitatory axon is
/// rewarded.
///
/// The Dendrite owns its Axons for the whole run; each Axon only keeps the
/// DendriteId of the dendrite it feeds.
#[derive(Clone, Debug)]
pub struct Dendrite {
    id: DendriteId,
    parameters: DendriteParameters,
    axons: Vec<Axon>,          // attached presynaptic axons, in attachment order
    v_mem: f64,                // (mV) membrane potential
    resting_value: f64,        // (mV) value v_mem was relaxing towards during the last step
    penalization_trace: f64,   // M, always <= 0
    spiked: bool,              // true on the step the threshold was crossed
}

impl Dendrite {
    /// construct a new Dendrite attaching the provided axons to it. Each axon
    /// receives a back-reference to `id`; axons already attached elsewhere are
    /// rejected.
    pub fn new(
        id: DendriteId,
        mut axons: Vec<Axon>,
        parameters: DendriteParameters,
    ) -> Result<Self, ConfigError> {
        parameters.validate()?;
        for (index, axon) in axons.iter_mut().enumerate() {
            axon.attach(index, id)?;
        }

        Ok(Dendrite {
            id,
            parameters,
            axons,
            v_mem: parameters.v_rest,
            resting_value: parameters.v_rest,
            penalization_trace: 0.0,
            spiked: false,
        })
    }

    pub fn id(&self) -> DendriteId {
        self.id
    }

    pub fn parameters(&self) -> &DendriteParameters {
        &self.parameters
    }

    pub fn axons(&self) -> &[Axon] {
        &self.axons
    }

    /// get the axon at `index`, in attachment order
    pub fn axon(&self, index: usize) -> Option<&Axon> {
        self.axons.get(index)
    }

    ///get the Dendrite v_mem (its output)
    pub fn v_mem(&self) -> f64 {
        self.v_mem
    }

    /// force the membrane potential, e.g. to start a trial from a chosen state
    pub fn set_v_mem(&mut self, v_mem: f64) {
        self.v_mem = v_mem;
    }

    pub fn resting_value(&self) -> f64 {
        self.resting_value
    }

    pub fn penalization_trace(&self) -> f64 {
        self.penalization_trace
    }

    pub fn spiked(&self) -> bool {
        self.spiked
    }

    /// advance every attached axon by one time step.
    ///
    /// All axons see the penalization trace as it was before this call, so
    /// this must run before `step` for the same time step.
    pub fn step_inputs<R: Rng + ?Sized>(&mut self, time_step: TimeStep, rng: &mut R) {
        let penalization_trace = self.penalization_trace;
        for axon in self.axons.iter_mut() {
            axon.step(time_step, penalization_trace, rng);
        }
    }

    /// advance the membrane by one time step, using the conductances the axons
    /// reached during this time step. Returns true if the dendrite fired.
    pub fn step(&mut self, dt: f64) -> bool {
        self.update_resting_value();
        self.update_v_mem(dt);
        self.update_penalization_trace(dt);
        self.spiked
    }

    /// the membrane relaxes towards V_rest shifted by the current injected by
    /// every axon, computed with the potential of the previous step
    fn update_resting_value(&mut self) {
        let v_mem = self.v_mem;
        let injected: f64 = self
            .axons
            .iter()
            .map(|axon| axon.conductance() * (axon.parameters().reversal_potential - v_mem))
            .sum();

        self.resting_value = self.parameters.v_rest + injected;
    }

    fn update_v_mem(&mut self, dt: f64) {
        let p = &self.parameters;

        // the action potential produced at the previous step is over: reset
        // the membrane and reward the axons which caused it
        if self.spiked {
            self.v_mem = p.v_reset;
            self.spiked = false;
            for axon in self.axons.iter_mut() {
                if axon.is_excitatory() {
                    axon.reward();
                }
            }
            return;
        }

        if self.v_mem < p.v_thr {
            self.v_mem = euler_step(self.v_mem, self.resting_value, p.tau, dt);
        } else {
            // threshold reached: show the action potential for one step
            self.v_mem = p.v_peak;
            self.spiked = true;
            trace!(target: "snn_stdp::dendrite", dendrite = %self.id, "postsynaptic spike");
        }
    }

    fn update_penalization_trace(&mut self, dt: f64) {
        if self.spiked {
            self.penalization_trace -= self.parameters.a_minus;
        } else {
            self.penalization_trace =
                euler_step(self.penalization_trace, 0.0, self.parameters.tau_minus, dt);
        }
    }

    /// bring every decaying variable of the dendrite and of its axons back to
    /// rest, as after a long period without spikes. Weights are kept.
    pub fn reset_transients(&mut self) {
        self.v_mem = self.parameters.v_rest;
        self.resting_value = self.parameters.v_rest;
        self.penalization_trace = 0.0;
        self.spiked = false;
        for axon in self.axons.iter_mut() {
            axon.reset_transients();
        }
    }
}
