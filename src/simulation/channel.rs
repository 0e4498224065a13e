//! Single-slot, last-write-wins channel between the integration loop and
//! its consumers
//!
//! The producer builds a complete [`Snapshot`] outside any lock and then
//! swaps it into the slot; the write lock is held only for that pointer
//! swap. Readers clone the `Arc` under the read lock and then work on an
//! immutable copy, so a read can never mix positions from one step with
//! velocities from another, and neither side waits on the other's work.
//!
//! Snapshots published faster than they are read are simply replaced.
//! Consumers reading faster than the producer publishes see the same
//! snapshot again.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::simulation::engine::StopSignal;
use crate::simulation::params::Parameters;
use crate::simulation::states::{BodySet, NVec3};

/// Immutable copy of the simulation state at one step
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub step: u64,
    pub t: f64, // simulated time (s)
    pub positions: Vec<NVec3>, // m
    pub velocities: Vec<NVec3>, // m/s
    pub steps_per_second: f64,
}

impl Snapshot {
    pub fn capture(sys: &BodySet, step: u64, steps_per_second: f64) -> Self {
        Self {
            step,
            t: sys.t,
            positions: sys.positions(),
            velocities: sys.velocities(),
            steps_per_second,
        }
    }
}

/// Cloneable handle on the shared slot; clones see the same slot
#[derive(Clone, Default)]
pub struct StateChannel {
    slot: Arc<RwLock<Arc<Snapshot>>>,
}

impl StateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel whose slot starts out holding `initial`.
    pub fn with_initial(initial: Snapshot) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        let mut slot = self.slot.write();
        debug_assert!(next.t >= slot.t, "simulated time must not run backwards");
        *slot = next;
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.slot.read())
    }
}

/// Run `consume` on its own thread against the latest snapshot, throttled
/// to at most `rate_hz` calls per second, until `stop` fires.
pub fn spawn_consumer<F>(channel: StateChannel, rate_hz: f64, stop: StopSignal, mut consume: F) -> JoinHandle<()>
where
    F: FnMut(&Snapshot) + Send + 'static,
{
    let frame = Duration::from_secs_f64(1.0 / rate_hz.max(1e-3));

    thread::spawn(move || loop {
        let start = Instant::now();

        consume(&channel.latest());

        if stop.is_stopped() {
            break;
        }

        // Sleep to hold the target rate
        let elapsed = start.elapsed();
        if elapsed < frame {
            thread::sleep(frame - elapsed);
        }
    })
}

/// [`spawn_consumer`] throttled to the configured `render_hz`.
pub fn spawn_render_consumer<F>(channel: StateChannel, parameters: &Parameters, stop: StopSignal, consume: F) -> JoinHandle<()>
where
    F: FnMut(&Snapshot) + Send + 'static,
{
    spawn_consumer(channel, parameters.render_hz, stop, consume)
}
