//! Numerical, physical and runtime parameters for the simulation
//!
//! `Parameters` holds:
//! - the fixed integration step and the gravitational constant (`h0`, `G`),
//! - the worker count the bodies are partitioned over,
//! - publishing and consumer cadence settings

/// Gravitational constant in SI units (m³ kg⁻¹ s⁻²)
pub const G_SI: f64 = 6.67430e-11;

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Parameters {
    pub h0: f64, // fixed step size (s)
    pub G: f64, // gravitational constant
    pub workers: usize, // number of cooperating workers
    pub publish_every: u64, // publish a snapshot every k steps
    pub render_hz: f64, // target consumer rate
    pub throughput_window: f64, // steps-per-second refresh window (s)
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            h0: 120.0,
            G: G_SI,
            workers: 1,
            publish_every: 1,
            render_hz: 60.0,
            throughput_window: 1.0,
        }
    }
}
