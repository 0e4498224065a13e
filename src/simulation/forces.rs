//! Pairwise Newtonian gravity, split across workers and globally reduced
//!
//! Each worker evaluates the net force only on the bodies in its own row
//! range, but against every body in the system, so it needs the full
//! position and mass arrays. The partial arrays (zero outside the owned
//! rows) are then summed through a [`Collective`], which yields the same
//! combined force array on every worker.

use std::ops::Range;

use crate::error::CollectiveError;
use crate::simulation::collective::Collective;
use crate::simulation::states::{BodySet, NVec3};

/// Net gravitational force on each body in `rows` from all other bodies
///
/// `out` must be as long as the system; entries outside `rows` are zeroed
/// so the arrays from disjoint row ranges can be summed element-wise.
/// A pair with zero separation contributes nothing.
#[allow(non_snake_case)]
pub fn partial_forces(sys: &BodySet, rows: Range<usize>, G: f64, out: &mut [NVec3]) {
    for f in out.iter_mut() {
        *f = NVec3::zeros();
    }

    for i in rows {
        let bi = &sys.bodies[i];
        let mut acc = NVec3::zeros();

        for (j, bj) in sys.bodies.iter().enumerate() {
            if i == j {
                continue;
            }

            // r points from i to j, so i is pulled along +r
            let r = bj.x - bi.x;
            let r2 = r.dot(&r);
            if r2 == 0.0 {
                continue;
            }

            let inv_r = r2.sqrt().recip();
            let inv_r3 = inv_r * inv_r * inv_r;
            acc += bj.m * inv_r3 * r;
        }

        // F_i = G m_i Σ m_j r / |r|^3
        out[i] = G * bi.m * acc;
    }
}

/// One worker's share of the force pass plus the reduction that combines it
pub struct ForceEvaluator<C: Collective> {
    #[allow(non_snake_case)]
    pub G: f64,
    rows: Range<usize>,
    collective: C,
    forces: Vec<NVec3>,
}

impl<C: Collective> ForceEvaluator<C> {
    /// Evaluator for a system of `n` bodies owning `rows`.
    #[allow(non_snake_case)]
    pub fn new(G: f64, n: usize, rows: Range<usize>, collective: C) -> Self {
        Self {
            G,
            rows,
            collective,
            forces: vec![NVec3::zeros(); n],
        }
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn collective(&self) -> &C {
        &self.collective
    }

    /// Authoritative net force on every body after the global reduction.
    pub fn forces(&mut self, sys: &BodySet) -> Result<&[NVec3], CollectiveError> {
        if self.forces.len() != sys.len() {
            self.forces.resize(sys.len(), NVec3::zeros());
        }
        partial_forces(sys, self.rows.clone(), self.G, &mut self.forces);
        self.collective.all_reduce_sum(&mut self.forces)?;
        Ok(&self.forces)
    }

    /// Gravitational acceleration `F_i / m_i` on every body.
    pub fn accelerations(&mut self, sys: &BodySet, out: &mut [NVec3]) -> Result<(), CollectiveError> {
        let forces = self.forces(sys)?;
        for ((a, f), b) in out.iter_mut().zip(forces.iter()).zip(sys.bodies.iter()) {
            *a = f / b.m;
        }
        Ok(())
    }
}
