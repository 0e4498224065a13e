//! Fixed-step velocity-Verlet (kick-drift-kick) integrator
//!
//! The acceleration from the end of one step is reused as `a_n` by the next,
//! so each step needs exactly one force pass and one global reduction:
//!
//! ```text
//! v_n+1/2 = v_n + dt/2 * a_n
//! x_n+1   = x_n + dt * v_n+1/2
//! a_n+1   = F(x_n+1) / m
//! v_n+1   = v_n+1/2 + dt/2 * a_n+1
//! ```
//!
//! The step size is fixed and not checked for stability.

use crate::error::CollectiveError;
use crate::simulation::collective::Collective;
use crate::simulation::forces::ForceEvaluator;
use crate::simulation::states::{BodySet, NVec3};
use crate::simulation::thrust::ThrustController;

pub struct Integrator<C: Collective> {
    pub h0: f64, // time step dt
    forces: ForceEvaluator<C>,
    accel: Vec<NVec3>, // gravitational a_n for every body
    primed: bool,
}

impl<C: Collective> Integrator<C> {
    pub fn new(h0: f64, forces: ForceEvaluator<C>) -> Self {
        Self {
            h0,
            forces,
            accel: Vec::new(),
            primed: false,
        }
    }

    pub fn forces(&self) -> &ForceEvaluator<C> {
        &self.forces
    }

    /// Gravitational accelerations from the most recent force pass.
    pub fn accelerations(&self) -> &[NVec3] {
        &self.accel
    }

    /// Evaluate `a_n` at the current positions.
    ///
    /// Called once before the first step and again whenever masses are
    /// changed from outside the loop.
    pub fn prime(&mut self, sys: &BodySet) -> Result<(), CollectiveError> {
        self.accel.resize(sys.len(), NVec3::zeros());
        self.forces.accelerations(sys, &mut self.accel)?;
        self.primed = true;
        Ok(())
    }

    /// Advance `sys` by one step of `h0`, applying `thrust` if given.
    pub fn step(&mut self, sys: &mut BodySet, mut thrust: Option<&mut ThrustController>) -> Result<(), CollectiveError> {
        if sys.is_empty() { // no bodies, return
            return Ok(());
        }
        if !self.primed {
            self.prime(sys)?;
        }

        let dt = self.h0;
        let half_dt = 0.5 * dt;
        let t0 = sys.t;

        // Thrust for this step is decided by the clock at the step's start
        let boost = match thrust.as_deref_mut() {
            Some(tc) => Some((tc.body(), tc.acceleration_at(t0))),
            None => None,
        };

        // Kick: v_n+1/2 = v_n + (dt/2) * a_n
        for (b, a) in sys.bodies.iter_mut().zip(self.accel.iter()) {
            b.v += half_dt * *a;
        }
        if let Some((k, a)) = boost {
            sys.bodies[k].v += half_dt * a;
        }

        // Drift: x_n+1 = x_n + dt * v_n+1/2
        for b in sys.bodies.iter_mut() {
            b.x += dt * b.v;
        }

        // Burn before the force pass so a_n+1 sees the post-burn mass
        if let Some(tc) = thrust.as_deref_mut() {
            let k = tc.body();
            tc.burn(t0, dt, &mut sys.bodies[k]);
        }

        // a_n+1 from x_n+1, reduced across all workers
        self.forces.accelerations(sys, &mut self.accel)?;

        // Kick: v_n+1 = v_n+1/2 + (dt/2) * a_n+1
        for (b, a) in sys.bodies.iter_mut().zip(self.accel.iter()) {
            b.v += half_dt * *a;
        }
        if let Some((k, a)) = boost {
            sys.bodies[k].v += half_dt * a;
        }

        sys.t += dt;
        Ok(())
    }
}
