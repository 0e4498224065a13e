//! Integration run loop and the workers that drive it
//!
//! An [`Engine`] owns one replica of the body state and advances it step by
//! step, publishing snapshots and counting throughput as it goes. It is
//! generic over the [`Collective`] its force pass reduces through:
//!
//! - `Engine<Solo>` is the single-process loop. Consumers read its
//!   [`StateChannel`] from other threads; external controls reach it
//!   through a [`MassControl`] handle.
//! - [`run_workers`] starts W engines on W threads, each owning a disjoint
//!   row range of the force pass and a full replica of the state, joined by
//!   a [`ThreadCollective`]. Rank 0 publishes.
//!
//! Loops run until a [`StopSignal`] fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::Mutex;

use crate::error::{CollectiveError, ConfigError, Result, SimError};
use crate::simulation::channel::{Snapshot, StateChannel};
use crate::simulation::collective::{Collective, Solo, ThreadCollective};
use crate::simulation::forces::ForceEvaluator;
use crate::simulation::integrator::Integrator;
use crate::simulation::partition::Partition;
use crate::simulation::scenario::Scenario;
use crate::simulation::states::BodySet;
use crate::simulation::thrust::ThrustController;
use crate::simulation::throughput::{ThroughputMeter, ThroughputSampler};

/// Shared flag telling run loops and consumers to finish
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Queue of "set body i's mass to factor × initial mass" requests
///
/// Requests are applied by the loop at the next step boundary.
#[derive(Debug, Clone, Default)]
pub struct MassControl {
    pending: Arc<Mutex<Vec<(usize, f64)>>>,
}

impl MassControl {
    pub fn set_mass_factor(&self, index: usize, factor: f64) {
        self.pending.lock().push((index, factor));
    }

    fn drain(&self) -> Vec<(usize, f64)> {
        std::mem::take(&mut *self.pending.lock())
    }
}

pub struct Engine<C: Collective = Solo> {
    pub system: BodySet,
    integrator: Integrator<C>,
    thrust: Option<ThrustController>,
    channel: Option<StateChannel>,
    publish_every: u64,
    meter: ThroughputMeter,
    sampler: Option<ThroughputSampler>,
    controls: Option<MassControl>,
    steps: u64,
}

impl Engine<Solo> {
    /// Single-process engine: one worker owning every row.
    pub fn new(scenario: Scenario) -> Self {
        let n = scenario.system.len();
        let forces = ForceEvaluator::new(scenario.parameters.G, n, 0..n, Solo);
        let mut engine = Self::assemble(scenario, forces);
        engine.controls = Some(MassControl::default());
        engine
    }

    /// Handle for changing masses while the loop runs on another thread.
    pub fn mass_control(&self) -> MassControl {
        self.controls.clone().unwrap_or_default()
    }
}

impl<C: Collective> Engine<C> {
    /// Engine for one worker of a partitioned worker set.
    pub fn for_worker(scenario: &Scenario, partition: &Partition, collective: C) -> Self {
        let rows = partition.range(collective.rank());
        let forces = ForceEvaluator::new(scenario.parameters.G, scenario.system.len(), rows, collective);
        Self::assemble(scenario.clone(), forces)
    }

    fn assemble(scenario: Scenario, forces: ForceEvaluator<C>) -> Self {
        let p = scenario.parameters;
        Self {
            system: scenario.system,
            integrator: Integrator::new(p.h0, forces),
            thrust: scenario.thrust,
            channel: None,
            publish_every: p.publish_every.max(1),
            meter: ThroughputMeter::new(Duration::from_secs_f64(p.throughput_window), Instant::now()),
            sampler: None,
            controls: None,
            steps: 0,
        }
    }

    /// Publish to `channel`, starting with the initial state.
    pub fn with_channel(mut self, channel: StateChannel) -> Self {
        channel.publish(Snapshot::capture(&self.system, self.steps, self.meter.current()));
        self.channel = Some(channel);
        self
    }

    /// Accept mass requests through `controls`.
    ///
    /// In a worker set each worker needs its own handle fed the same
    /// requests, since applying one re-primes through the collective.
    pub fn with_mass_control(mut self, controls: MassControl) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn with_sampler(mut self, sampler: ThroughputSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn channel(&self) -> Option<&StateChannel> {
        self.channel.as_ref()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn thrust(&self) -> Option<&ThrustController> {
        self.thrust.as_ref()
    }

    pub fn integrator(&self) -> &Integrator<C> {
        &self.integrator
    }

    pub fn take_samples(&mut self) -> Vec<f64> {
        self.sampler.take().map(ThroughputSampler::into_samples).unwrap_or_default()
    }

    /// Set body `index`'s mass to `factor` times its load-time mass.
    ///
    /// Re-evaluates forces through the collective, so in a worker set every
    /// worker has to make the same call at the same step.
    pub fn set_mass_factor(&mut self, index: usize, factor: f64) -> Result<()> {
        let n = self.system.len();
        let body = self.system.bodies.get_mut(index).ok_or_else(|| ConfigError::InvalidParameter {
            name: "mass index",
            reason: format!("{index} out of range for {n} bodies"),
        })?;
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "mass factor",
                reason: format!("{factor} must be positive and finite"),
            }
            .into());
        }
        body.m = factor * body.m0;
        self.integrator.prime(&self.system)?;
        Ok(())
    }

    /// Apply queued mass requests. A bad request is skipped; a failed
    /// reduction while re-priming is fatal.
    fn apply_controls(&mut self) -> Result<()> {
        let pending = match &self.controls {
            Some(controls) => controls.drain(),
            None => return Ok(()),
        };
        for (index, factor) in pending {
            match self.set_mass_factor(index, factor) {
                Ok(()) => {}
                Err(SimError::Config(e)) => warn!("ignoring mass request: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Publish the current state unless the last step already did.
    fn publish_final(&self) {
        if let Some(channel) = &self.channel {
            if self.steps % self.publish_every != 0 {
                channel.publish(Snapshot::capture(&self.system, self.steps, self.meter.current()));
            }
        }
    }

    /// Advance one step, then publish and count it.
    pub fn step(&mut self) -> Result<()> {
        self.apply_controls()?;
        self.integrator.step(&mut self.system, self.thrust.as_mut())?;
        self.steps += 1;

        let now = Instant::now();
        let sps = self.meter.tick(now);
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.tick(now);
        }

        if let Some(channel) = &self.channel {
            if self.steps % self.publish_every == 0 {
                channel.publish(Snapshot::capture(&self.system, self.steps, sps));
            }
        }
        Ok(())
    }

    pub fn run_steps(&mut self, n: u64) -> Result<()> {
        for _ in 0..n {
            self.step()?;
        }
        self.publish_final();
        Ok(())
    }

    /// Step until `stop` fires.
    ///
    /// A peer leaving the worker set is a clean exit only if the stop
    /// signal explains it; otherwise it is an error.
    pub fn run(&mut self, stop: &StopSignal) -> Result<()> {
        let rank = self.integrator.forces().collective().rank();
        info!("worker {rank} running");

        while !stop.is_stopped() {
            match self.step() {
                Ok(()) => {}
                Err(SimError::Collective(CollectiveError::Disbanded)) if stop.is_stopped() => break,
                Err(e) => {
                    warn!("worker {rank} failed at step {}: {e}", self.steps);
                    return Err(e);
                }
            }
        }
        self.publish_final();

        info!("worker {rank} stopped after {} steps, t = {:.0}s", self.steps, self.system.t);
        Ok(())
    }
}

/// Options for [`run_workers`]
#[derive(Clone, Default)]
pub struct RunOptions {
    pub channel: Option<StateChannel>, // rank 0 publishes here
    pub max_steps: Option<u64>, // stop each worker after this many steps
    pub sampler: Option<ThroughputSampler>, // every rank samples with a copy
}

/// What one worker ended with
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub rank: usize,
    pub steps: u64,
    pub system: BodySet,
    pub samples: Vec<f64>,
}

/// Run the scenario on `scenario.parameters.workers` threads in lock-step.
///
/// Returns one report per worker, ordered by rank. A failure or panic on
/// any worker fails the whole run.
pub fn run_workers(scenario: &Scenario, stop: &StopSignal, options: RunOptions) -> Result<Vec<WorkerReport>> {
    let partition = Partition::new(scenario.system.len(), scenario.parameters.workers)?;
    info!("partition: {:?}", partition.ranges());

    let results: Vec<thread::Result<Result<WorkerReport>>> = thread::scope(|s| {
        let handles: Vec<_> = ThreadCollective::group(partition.workers())
            .into_iter()
            .map(|collective| {
                let partition = &partition;
                let options = options.clone();
                s.spawn(move || -> Result<WorkerReport> {
                    let rank = collective.rank();
                    let mut engine = Engine::for_worker(scenario, partition, collective);
                    if rank == 0 {
                        if let Some(channel) = options.channel {
                            engine = engine.with_channel(channel);
                        }
                    }
                    if let Some(sampler) = options.sampler {
                        engine = engine.with_sampler(sampler);
                    }

                    match options.max_steps {
                        Some(n) => engine.run_steps(n)?,
                        None => engine.run(stop)?,
                    }

                    Ok(WorkerReport {
                        rank,
                        steps: engine.steps(),
                        samples: engine.take_samples(),
                        system: engine.system,
                    })
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut reports = Vec::with_capacity(results.len());
    let mut first_err = None;
    for result in results {
        match result {
            Err(_) => return Err(SimError::WorkerPanicked),
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            }
            Ok(Ok(report)) => reports.push(report),
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}
