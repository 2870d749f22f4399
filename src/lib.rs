//! Leaky integrate-and-fire neuron driven by many presynaptic axons whose
//! weights evolve under additive spike-timing-dependent plasticity
//! (competitive Hebbian learning, Song, Miller & Abbott 2000).
//!
//! - [`network`] holds the simulation core: [`network::axon::Axon`],
//!   [`network::dendrite::Dendrite`] and the [`network::Network`] driving them
//!   through discrete time steps.
//! - [`experiment`] contains the drivers reproducing the classic experiments
//!   (firing rate sweep, burst inputs with random latencies).

pub mod error;
pub mod euler;
pub mod experiment;
pub mod network;

pub use error::{ConfigError, SnnError, SnnResult};
pub use network::axon::{Axon, AxonParameters, SpikeSource};
pub use network::dendrite::{Dendrite, DendriteParameters};
pub use network::{DendriteId, Network, TimeStep};
