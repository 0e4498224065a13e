//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces the runtime bundle
//! containing:
//! - numerical and runtime parameters (`Parameters`)
//! - system state (`BodySet` with bodies at t = 0, net momentum cancelled)
//! - the optional thrust program (`ThrustController`)
//!
//! An engine or a set of workers is then started from the scenario.

use log::info;

use crate::configuration::config::{BodyConfig, ScenarioConfig};
use crate::error::ConfigError;
use crate::simulation::params::Parameters;
use crate::simulation::partition::Partition;
use crate::simulation::states::{Body, BodySet, NVec3};
use crate::simulation::thrust::{ThrustController, ThrustPhase};

/// Runtime bundle a simulation is started from
#[derive(Debug, Clone)]
pub struct Scenario {
    pub parameters: Parameters,
    pub system: BodySet,
    pub thrust: Option<ThrustController>,
}

impl Scenario {
    /// Wrap an already-built system. Momentum is left as given.
    pub fn new(system: BodySet, parameters: Parameters) -> Self {
        Self {
            parameters,
            system,
            thrust: None,
        }
    }

    pub fn with_thrust(mut self, thrust: ThrustController) -> Self {
        self.thrust = Some(thrust);
        self
    }

    pub fn build_scenario(cfg: ScenarioConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        // Bodies: map `BodyConfig` -> runtime `Body` on inclined circular starts
        let bodies: Vec<Body> = cfg
            .bodies
            .iter()
            .enumerate()
            .map(|(i, bc)| body_from_config(i, bc))
            .collect();

        let mut system = BodySet::new(bodies);
        system.zero_momentum();

        let thrust = match &cfg.thrust {
            Some(tc) => {
                let body = cfg
                    .bodies
                    .iter()
                    .position(|b| b.name == tc.body)
                    .ok_or_else(|| ConfigError::UnknownThrustBody(tc.body.clone()))?;
                let phases = tc
                    .phases
                    .iter()
                    .map(|p| ThrustPhase {
                        start: p.start,
                        duration: p.duration,
                        accel: NVec3::from(p.acceleration),
                    })
                    .collect();
                Some(ThrustController::new(body, system.bodies[body].m, tc.dry_mass, phases)?)
            }
            None => None,
        };

        let parameters = cfg.parameters();
        Partition::new(system.len(), parameters.workers)?;

        info!(
            "scenario: {} bodies, dt = {}s, {} worker(s), thrust {}",
            system.len(),
            parameters.h0,
            parameters.workers,
            if thrust.is_some() { "on" } else { "off" },
        );

        Ok(Self {
            parameters,
            system,
            thrust,
        })
    }
}

/// Place a body on its orbit circle, tilted by its inclination.
fn body_from_config(id: usize, bc: &BodyConfig) -> Body {
    let inc = bc.inclination.to_radians();
    let (s, c) = inc.sin_cos();
    let x = NVec3::new(bc.orbit_radius * c, bc.orbit_radius * s, 0.0);
    let v = NVec3::new(-bc.orbit_speed * s, bc.orbit_speed * c, 0.0);

    let mut body = Body::new(id, bc.name.clone(), bc.mass, x, v);
    body.radius = bc.radius;
    body.color = bc.color;
    body
}
