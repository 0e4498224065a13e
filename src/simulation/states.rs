//! Core state types for the N-body simulation.
//!
//! Defines the per-body state (`Body`) and the ordered, fixed-size collection
//! (`BodySet`) that the integrator advances. All quantities are SI:
//! metres, metres per second, kilograms, seconds.

use nalgebra::Vector3;
pub type NVec3 = Vector3<f64>;

#[derive(Debug, Clone)]
pub struct Body {
    pub id: usize, // index into BodySet::bodies
    pub name: String,
    pub x: NVec3, // position
    pub v: NVec3, // velocity
    pub m: f64, // mass
    pub m0: f64, // mass at load time, reference for mass scaling
    pub radius: f64, // render only
    pub color: [f32; 3], // render only
}

impl Body {
    pub fn new(id: usize, name: impl Into<String>, m: f64, x: NVec3, v: NVec3) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            v,
            m,
            m0: m,
            radius: 0.0,
            color: [1.0, 1.0, 1.0],
        }
    }

    pub fn momentum(&self) -> NVec3 {
        self.m * self.v
    }
}

#[derive(Debug, Clone)]
pub struct BodySet {
    pub bodies: Vec<Body>,
    pub t: f64, // simulated time
}

impl BodySet {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Index of the heaviest body, first one wins on ties.
    pub fn heaviest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, b) in self.bodies.iter().enumerate() {
            match best {
                Some(j) if self.bodies[j].m >= b.m => {}
                _ => best = Some(i),
            }
        }
        best
    }

    pub fn total_momentum(&self) -> NVec3 {
        self.bodies.iter().fold(NVec3::zeros(), |p, b| p + b.momentum())
    }

    /// Cancel the net momentum by adjusting the heaviest body's velocity.
    ///
    /// After this call `Σ mᵢvᵢ ≈ 0`, so the barycentre stays put and a
    /// heavy central star does not drift off with its planets.
    pub fn zero_momentum(&mut self) {
        let Some(h) = self.heaviest() else {
            return;
        };
        let p = self.total_momentum();
        let star = &mut self.bodies[h];
        star.v -= p / star.m;
    }

    /// Total kinetic plus pairwise potential energy.
    #[allow(non_snake_case)]
    pub fn total_energy(&self, G: f64) -> f64 {
        let n = self.bodies.len();
        let mut kinetic = 0.0;
        let mut potential = 0.0;
        for i in 0..n {
            let bi = &self.bodies[i];
            kinetic += 0.5 * bi.m * bi.v.norm_squared();
            for j in (i + 1)..n {
                let bj = &self.bodies[j];
                let d = (bj.x - bi.x).norm();
                if d > 0.0 {
                    potential -= G * bi.m * bj.m / d;
                }
            }
        }
        kinetic + potential
    }

    /// Total angular momentum about the origin.
    pub fn angular_momentum(&self) -> NVec3 {
        self.bodies
            .iter()
            .fold(NVec3::zeros(), |l, b| l + b.x.cross(&b.momentum()))
    }

    pub fn positions(&self) -> Vec<NVec3> {
        self.bodies.iter().map(|b| b.x).collect()
    }

    pub fn velocities(&self) -> Vec<NVec3> {
        self.bodies.iter().map(|b| b.v).collect()
    }
}
