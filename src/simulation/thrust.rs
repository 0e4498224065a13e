//! Staged thrust for one powered body
//!
//! A thrust program is a list of phases, each a time window with a constant
//! acceleration vector. The controller walks the list with a cursor that
//! only ever moves forward:
//!
//! - before a phase's window the body coasts (`Idle`),
//! - inside `[start, start + duration)` the phase acceleration is added to
//!   the body's gravitational acceleration and fuel is burned (`Active`),
//! - once the window has passed the cursor moves on and the phase is never
//!   applied again; past the last phase the program is `Terminal`.
//!
//! Fuel burn is linear: every step inside a phase removes
//! `(m0 - dry_mass) / duration * dt` kilograms, floored at `dry_mass`.

use log::debug;

use crate::error::ConfigError;
use crate::simulation::states::{Body, NVec3};

#[derive(Debug, Clone, PartialEq)]
pub struct ThrustPhase {
    pub start: f64, // s
    pub duration: f64, // s
    pub accel: NVec3, // m/s^2
}

impl ThrustPhase {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrustState {
    Idle,
    Active(usize),
    Terminal,
}

#[derive(Debug, Clone)]
pub struct ThrustController {
    body: usize,
    m0: f64,
    dry_mass: f64,
    phases: Vec<ThrustPhase>,
    cursor: usize,
}

impl ThrustController {
    /// Build a controller for body index `body` with load-time mass `m0`.
    ///
    /// Phases are sorted by start time; non-finite values, non-positive
    /// durations and overlapping windows are rejected.
    pub fn new(body: usize, m0: f64, dry_mass: f64, mut phases: Vec<ThrustPhase>) -> Result<Self, ConfigError> {
        if !(dry_mass > 0.0 && dry_mass <= m0) {
            return Err(ConfigError::InvalidParameter {
                name: "thrust.dry_mass",
                reason: format!("{dry_mass} kg must be in (0, {m0}]"),
            });
        }

        for (index, p) in phases.iter().enumerate() {
            let finite = p.start.is_finite() && p.duration.is_finite() && p.accel.iter().all(|c| c.is_finite());
            if !finite {
                return Err(ConfigError::InvalidPhase {
                    index,
                    reason: "values must be finite".into(),
                });
            }
            if p.duration <= 0.0 {
                return Err(ConfigError::InvalidPhase {
                    index,
                    reason: format!("duration {}s must be positive", p.duration),
                });
            }
        }

        phases.sort_by(|a, b| a.start.total_cmp(&b.start));
        for pair in phases.windows(2) {
            if pair[0].end() > pair[1].start {
                return Err(ConfigError::OverlappingPhases {
                    first: pair[0].start,
                    second: pair[1].start,
                });
            }
        }

        Ok(Self {
            body,
            m0,
            dry_mass,
            phases,
            cursor: 0,
        })
    }

    pub fn body(&self) -> usize {
        self.body
    }

    pub fn phases(&self) -> &[ThrustPhase] {
        &self.phases
    }

    pub fn is_terminal(&self) -> bool {
        self.cursor >= self.phases.len()
    }

    /// Advance the cursor past every phase that has ended by `t` and report
    /// where the program stands. Queries earlier than a completed phase's
    /// end never bring it back.
    pub fn state_at(&mut self, t: f64) -> ThrustState {
        while let Some(phase) = self.phases.get(self.cursor) {
            if t < phase.end() {
                break;
            }
            debug!("thrust phase {} complete at t = {t:.1}s", self.cursor);
            self.cursor += 1;
        }

        match self.phases.get(self.cursor) {
            None => ThrustState::Terminal,
            Some(phase) if phase.contains(t) => ThrustState::Active(self.cursor),
            Some(_) => ThrustState::Idle,
        }
    }

    /// Extra acceleration on the powered body at time `t`, zero when idle.
    pub fn acceleration_at(&mut self, t: f64) -> NVec3 {
        match self.state_at(t) {
            ThrustState::Active(k) => self.phases[k].accel,
            _ => NVec3::zeros(),
        }
    }

    /// Burn fuel for one step of length `dt` starting at `t`.
    ///
    /// Leaves the mass unchanged when no phase is active.
    pub fn burn(&mut self, t: f64, dt: f64, body: &mut Body) {
        if let ThrustState::Active(k) = self.state_at(t) {
            let rate = (self.m0 - self.dry_mass) / self.phases[k].duration;
            body.m = (body.m - rate * dt).max(self.dry_mass);
        }
    }
}
