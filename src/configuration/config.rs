//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – worker count and publishing cadence
//! - [`ParametersConfig`] – fixed time step and gravitational constant
//! - [`BodyConfig`]       – initial orbit for each body
//! - [`ThrustConfig`]     – optional staged thrust program for one body
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   workers: 2              # bodies are partitioned over this many workers
//!   publish_every: 1        # publish a snapshot every k steps
//!   render_hz: 60.0         # consumer target rate
//!   throughput_window_s: 1.0
//!
//! parameters:
//!   h0: 120.0               # fixed step size (s)
//!   G: 6.67430e-11          # optional, SI value by default
//!
//! bodies:
//!   - name: Sun
//!     mass: 1.989e30
//!     radius: 7.0e8
//!   - name: Earth
//!     mass: 5.97e24
//!     radius: 6.37e6
//!     orbit_radius: 1.50e11 # initial distance from the origin (m)
//!     orbit_speed: 29780.0  # initial tangential speed (m/s)
//!     color: [0.1, 0.3, 1.0]
//!     inclination: 0.0      # degrees
//!
//! thrust:
//!   body: Earth
//!   dry_mass: 5.0e24
//!   phases:
//!     - start: 0.0
//!       duration: 3600.0
//!       acceleration: [0.0, 0.01, 0.0]
//! ```
//!
//! The scenario builder maps this configuration into the runtime
//! `BodySet` and `Parameters`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::simulation::params::{Parameters, G_SI};

/// Runtime layout of the simulation
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub workers: usize, // number of workers the bodies are split over
    pub publish_every: u64, // publish every k-th step
    pub render_hz: f64, // rate consumers are throttled to
    pub throughput_window_s: f64, // steps-per-second refresh window
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            publish_every: 1,
            render_hz: 60.0,
            throughput_window_s: 1.0,
        }
    }
}

fn default_g() -> f64 {
    G_SI
}

/// Global numerical and physical parameters for a scenario
#[derive(Deserialize, Debug, Clone)]
#[allow(non_snake_case)]
pub struct ParametersConfig {
    pub h0: f64, // time step size (s)
    #[serde(default = "default_g")]
    pub G: f64, // gravitational constant
}

fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Configuration for a single body's initial orbit
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub name: String,
    pub mass: f64, // kg
    #[serde(default)]
    pub radius: f64, // render radius (m)
    #[serde(default)]
    pub orbit_radius: f64, // initial distance from the origin (m)
    #[serde(default)]
    pub orbit_speed: f64, // initial tangential speed (m/s)
    #[serde(default = "default_color")]
    pub color: [f32; 3], // render colour
    #[serde(default)]
    pub inclination: f64, // degrees
}

/// One thrust window
#[derive(Deserialize, Debug, Clone)]
pub struct PhaseConfig {
    pub start: f64, // s
    pub duration: f64, // s
    pub acceleration: [f64; 3], // m/s^2
}

/// Staged thrust program for one named body
#[derive(Deserialize, Debug, Clone)]
pub struct ThrustConfig {
    pub body: String,
    pub dry_mass: f64, // kg left when all fuel is burned
    pub phases: Vec<PhaseConfig>,
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub parameters: ParametersConfig,
    pub bodies: Vec<BodyConfig>,
    #[serde(default)]
    pub thrust: Option<ThrustConfig>,
}

impl ScenarioConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Reject configurations the engine cannot run.
    ///
    /// Thrust phase timing is checked when the thrust controller is built.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.bodies.is_empty() {
            return Err(ConfigError::NoBodies);
        }

        for b in &self.bodies {
            if !(b.mass.is_finite() && b.mass > 0.0) {
                return Err(ConfigError::InvalidBody {
                    name: b.name.clone(),
                    reason: format!("mass {} must be positive and finite", b.mass),
                });
            }
            let finite = b.orbit_radius.is_finite() && b.orbit_speed.is_finite() && b.inclination.is_finite();
            if !finite {
                return Err(ConfigError::InvalidBody {
                    name: b.name.clone(),
                    reason: "orbit values must be finite".into(),
                });
            }
        }

        positive("parameters.h0", self.parameters.h0)?;
        positive("parameters.G", self.parameters.G)?;
        positive("engine.render_hz", self.engine.render_hz)?;
        positive("engine.throughput_window_s", self.engine.throughput_window_s)?;

        let n = self.bodies.len();
        if self.engine.workers == 0 || self.engine.workers > n {
            return Err(ConfigError::InvalidWorkerCount {
                workers: self.engine.workers,
                bodies: n,
            });
        }
        if self.engine.publish_every == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "engine.publish_every",
                reason: "must be at least 1".into(),
            });
        }

        if let Some(thrust) = &self.thrust {
            if !self.bodies.iter().any(|b| b.name == thrust.body) {
                return Err(ConfigError::UnknownThrustBody(thrust.body.clone()));
            }
        }

        Ok(())
    }

    /// Runtime parameters described by this configuration.
    pub fn parameters(&self) -> Parameters {
        Parameters {
            h0: self.parameters.h0,
            G: self.parameters.G,
            workers: self.engine.workers,
            publish_every: self.engine.publish_every,
            render_hz: self.engine.render_hz,
            throughput_window: self.engine.throughput_window_s,
        }
    }
}

fn positive(name: &'static str, value: f64) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("{value} must be positive and finite"),
        })
    }
}
