use crate::network::DendriteId;

/// Result type for fallible network, persistence and experiment operations
pub type SnnResult<T> = Result<T, SnnError>;

/// Precondition violations detected while building axons, dendrites or networks.
/// They are reported to the caller and never recovered internally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("time constant `{name}` must be positive and finite, got {value}")]
    InvalidTimeConstant { name: &'static str, value: f64 },

    #[error("spike probability must lie in [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("conductance bounds must satisfy 0 <= g_min <= g_max, got g_min = {g_min}, g_max = {g_max}")]
    InvalidBounds { g_min: f64, g_max: f64 },

    #[error("initial boost {boost} lies outside [{g_min}, {g_max}]")]
    BoostOutOfBounds { boost: f64, g_min: f64, g_max: f64 },

    #[error("parameter `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("threshold potential {v_thr} mV lies above the peak potential {v_peak} mV")]
    ThresholdAbovePeak { v_thr: f64, v_peak: f64 },

    #[error("time step must be positive and finite, got {0} ms")]
    InvalidTimeStep(f64),

    #[error("duration `{name}` must be positive and finite, got {value} ms")]
    InvalidDuration { name: &'static str, value: f64 },

    #[error("latency spread must be non-negative and finite, got {0} ms")]
    InvalidLatencySpread(f64),

    #[error("axon {index} is already attached to dendrite {dendrite}")]
    AxonAlreadyAttached { index: usize, dendrite: DendriteId },
}

/// Errors that can occur outside the per-step algorithms
#[derive(Debug, thiserror::Error)]
pub enum SnnError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("dendrite {0} does not exist in this network")]
    UnknownDendrite(DendriteId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("simulation worker `{0}` panicked")]
    WorkerPanicked(String),
}

/// check that a time constant is usable as a divisor of the decay equation
pub(crate) fn check_time_constant(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeConstant { name, value })
    }
}

pub(crate) fn check_duration(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { name, value })
    }
}

pub(crate) fn check_finite(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name, value })
    }
}
