/* The euler module provides the numeric primitive shared by every decaying
state variable of the model (synaptic conductance, eligibility trace,
penalization trace and membrane voltage): one explicit-Euler step of a
first-order linear ODE relaxing towards a resting value. */

/// time derivative of an exponential decay towards `resting_value` with
/// time constant `tau`, i.e. dx/dt = -(x - resting_value) / tau
pub fn exponential_decay(x: f64, resting_value: f64, tau: f64) -> f64 {
    -(x - resting_value) / tau
}

/// advance `x` by one explicit-Euler step of length `dt` towards `resting_value`.
///
/// `tau` must be positive. No stability check is performed: `dt` is expected
/// to be small compared to `tau`, otherwise the step overshoots the resting
/// value (and for `dt > 2 * tau` it diverges).
pub fn euler_step(x: f64, resting_value: f64, tau: f64, dt: f64) -> f64 {
    x + dt * exponential_decay(x, resting_value, tau)
}
