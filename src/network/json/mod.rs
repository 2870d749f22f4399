use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SnnResult;
use crate::network::axon::{Axon, AxonParameters, SpikeSource};
use crate::network::dendrite::DendriteParameters;
use crate::network::Network;

/// Serializable description of a whole Network. Current weights are stored
/// next to the parameters, so a trained network can be saved and restored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkData {
    pub dt_ms: f64,
    pub dendrites: Vec<DendriteData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DendriteData {
    #[serde(default)]
    pub parameters: DendriteParameters,
    pub axons: Vec<AxonData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxonData {
    pub spike_source: SpikeSource,
    #[serde(default)]
    pub parameters: AxonParameters,
    /// weight reached so far; when missing, `parameters.boost` is used
    #[serde(default)]
    pub boost: Option<f64>,
}

impl NetworkData {
    /// build a fresh Network (all transients at rest) from this description
    pub fn build(&self) -> SnnResult<Network> {
        let mut network = Network::new(self.dt_ms)?;
        for dendrite_data in &self.dendrites {
            let mut axons = Vec::with_capacity(dendrite_data.axons.len());
            for axon_data in &dendrite_data.axons {
                let mut axon = Axon::new(axon_data.spike_source.clone(), axon_data.parameters)?;
                if let Some(boost) = axon_data.boost {
                    axon.restore_boost(boost)?;
                }
                axons.push(axon);
            }
            network.add_dendrite(axons, dendrite_data.parameters)?;
        }
        Ok(network)
    }
}

impl From<&Network> for NetworkData {
    fn from(network: &Network) -> Self {
        NetworkData {
            dt_ms: network.dt(),
            dendrites: network
                .dendrites()
                .iter()
                .map(|dendrite| DendriteData {
                    parameters: *dendrite.parameters(),
                    axons: dendrite
                        .axons()
                        .iter()
                        .map(|axon| AxonData {
                            spike_source: axon.spike_source().clone(),
                            parameters: *axon.parameters(),
                            boost: Some(axon.boost()),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Load a network description from a JSON file and build the Network
pub fn load_from_file<P: AsRef<Path>>(path: P) -> SnnResult<Network> {
    let path = path.as_ref();
    let read = fs::read_to_string(path)?;
    let data: NetworkData = serde_json::from_str(&read)?;
    let network = data.build()?;
    info!(
        path = %path.display(),
        dendrites = network.dendrites().len(),
        "network loaded"
    );
    Ok(network)
}

/// Save the description of a Network, including its current weights, to a JSON file
pub fn save_to_file<P: AsRef<Path>>(network: &Network, path: P) -> SnnResult<()> {
    let serialized = serde_json::to_string_pretty(&NetworkData::from(network))?;
    fs::write(path.as_ref(), serialized)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SnnError};
    use crate::network::axon::INHIBITORY_REVERSAL_POTENTIAL;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_data() -> NetworkData {
        NetworkData {
            dt_ms: 0.1,
            dendrites: vec![DendriteData {
                parameters: DendriteParameters::default(),
                axons: vec![
                    AxonData {
                        spike_source: SpikeSource::Bernoulli(0.05),
                        parameters: AxonParameters::default(),
                        boost: None,
                    },
                    AxonData {
                        spike_source: SpikeSource::schedule([1, 4, 9]),
                        parameters: AxonParameters::inhibitory().with_weight(0.05, 0.05),
                        boost: None,
                    },
                ],
            }],
        }
    }

    #[test]
    fn parses_minimal_description_with_defaults() {
        let json = r#"{
            "dt_ms": 0.1,
            "dendrites": [
                { "axons": [
                    { "spike_source": { "Bernoulli": 0.01 } },
                    { "spike_source": { "Schedule": [3, 7] },
                      "parameters": { "reversal_potential": -70.0 } }
                ] }
            ]
        }"#;
        let data: NetworkData = serde_json::from_str(json).unwrap();
        let network = data.build().unwrap();
        let dendrite = &network.dendrites()[0];
        assert_eq!(*dendrite.parameters(), DendriteParameters::default());
        assert_eq!(dendrite.axons().len(), 2);
        assert!(dendrite.axons()[0].is_excitatory());
        assert_eq!(
            dendrite.axons()[1].parameters().reversal_potential,
            INHIBITORY_REVERSAL_POTENTIAL
        );
        assert_eq!(dendrite.axons()[1].boost(), 0.015);
    }

    #[test]
    fn snapshot_keeps_trained_weights() {
        let mut network = sample_data().build().unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        network.run(2_000, &mut rng);

        let snapshot = NetworkData::from(&network);
        let restored = snapshot.build().unwrap();
        let before: Vec<f64> = network.dendrites()[0].axons().iter().map(Axon::boost).collect();
        let after: Vec<f64> = restored.dendrites()[0].axons().iter().map(Axon::boost).collect();
        assert_eq!(before, after);
        assert_eq!(restored.current_step(), 0);
    }

    #[test]
    fn invalid_description_is_rejected() {
        let mut data = sample_data();
        data.dendrites[0].axons[0].spike_source = SpikeSource::Bernoulli(2.0);
        assert!(matches!(
            data.build(),
            Err(SnnError::Config(ConfigError::InvalidProbability(_)))
        ));
    }

    #[test]
    fn saved_weight_outside_bounds_is_rejected() {
        for boost in [0.02, -0.001, f64::NAN] {
            let mut data = sample_data();
            data.dendrites[0].axons[0].boost = Some(boost);
            assert!(matches!(
                data.build(),
                Err(SnnError::Config(ConfigError::BoostOutOfBounds { .. }))
            ));
        }

        let mut data = sample_data();
        data.dendrites[0].axons[0].boost = Some(0.0);
        let network = data.build().unwrap();
        assert_eq!(network.dendrites()[0].axons()[0].boost(), 0.0);
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("snn_stdp_json_{}.json", std::process::id()));
        let network = sample_data().build().unwrap();
        save_to_file(&network, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(NetworkData::from(&loaded), NetworkData::from(&network));
    }
}
