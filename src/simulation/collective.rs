//! Global commutative reduction over a set of cooperating workers
//!
//! The force pass is split across workers, each filling only the rows it
//! owns. [`Collective::all_reduce_sum`] combines those partial arrays into
//! one element-wise sum that every worker receives identically. It is a
//! barrier: no worker gets a result before every worker has contributed.
//!
//! Two transports are provided:
//! - [`Solo`]: a single worker, the reduction is the identity.
//! - [`ThreadCollective`]: W threads in one process sharing a rendezvous
//!   slot guarded by a `parking_lot` mutex and condvar.

use std::sync::Arc;
use std::thread;

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::error::CollectiveError;
use crate::simulation::states::NVec3;

/// A worker's view of the worker set it belongs to.
pub trait Collective {
    /// This worker's index in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the set.
    fn size(&self) -> usize;

    /// Replace `buf` with the element-wise sum of every worker's `buf`.
    ///
    /// Blocks until all workers have contributed. On error the contents of
    /// `buf` are unspecified and the worker set must be considered dead.
    fn all_reduce_sum(&mut self, buf: &mut [NVec3]) -> Result<(), CollectiveError>;
}

/// The trivial worker set of one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Solo;

impl Collective for Solo {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&mut self, _buf: &mut [NVec3]) -> Result<(), CollectiveError> {
        Ok(())
    }
}

struct Round {
    generation: u64,
    arrived: usize,
    slots: Vec<Option<Vec<NVec3>>>,
    result: Vec<NVec3>,
    aborted: Option<usize>,
    departed: bool,
}

struct Shared {
    size: usize,
    round: Mutex<Round>,
    cv: Condvar,
}

/// One worker's handle on a thread-backed worker set.
///
/// Handles are created together by [`ThreadCollective::group`] and moved
/// into their threads. Dropping a handle while panicking aborts the set for
/// everyone; dropping it normally marks the set as disbanded so peers still
/// waiting are released instead of blocking forever.
pub struct ThreadCollective {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadCollective {
    /// Create `size` connected handles, ordered by rank.
    pub fn group(size: usize) -> Vec<ThreadCollective> {
        let shared = Arc::new(Shared {
            size,
            round: Mutex::new(Round {
                generation: 0,
                arrived: 0,
                slots: vec![None; size],
                result: Vec::new(),
                aborted: None,
                departed: false,
            }),
            cv: Condvar::new(),
        });

        (0..size)
            .map(|rank| ThreadCollective {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Fail the collective for every worker, now and in later rounds.
    pub fn abort(&self) {
        let mut round = self.shared.round.lock();
        if round.aborted.is_none() {
            round.aborted = Some(self.rank);
        }
        self.shared.cv.notify_all();
    }

    fn check(round: &Round) -> Result<(), CollectiveError> {
        if let Some(rank) = round.aborted {
            return Err(CollectiveError::Aborted { rank });
        }
        if round.departed {
            return Err(CollectiveError::Disbanded);
        }
        Ok(())
    }
}

impl Collective for ThreadCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_reduce_sum(&mut self, buf: &mut [NVec3]) -> Result<(), CollectiveError> {
        let shared = &*self.shared;
        let mut round = shared.round.lock();
        Self::check(&round)?;

        if let Some(other) = round.slots.iter().flatten().next() {
            if other.len() != buf.len() {
                return Err(CollectiveError::SizeMismatch {
                    rank: self.rank,
                    got: buf.len(),
                    expected: other.len(),
                });
            }
        }

        round.slots[self.rank] = Some(buf.to_vec());
        round.arrived += 1;

        if round.arrived == shared.size {
            // Sum in rank order so every worker sees bit-identical results.
            let mut sum = vec![NVec3::zeros(); buf.len()];
            for slot in round.slots.iter_mut() {
                if let Some(part) = slot.take() {
                    for (s, p) in sum.iter_mut().zip(part.iter()) {
                        *s += p;
                    }
                }
            }
            round.result = sum;
            round.arrived = 0;
            round.generation += 1;
            shared.cv.notify_all();
        } else {
            let generation = round.generation;
            while round.generation == generation {
                Self::check(&round)?;
                shared.cv.wait(&mut round);
            }
        }

        // The result of this round cannot be overwritten before we copy it:
        // the next round needs our own contribution to complete.
        buf.copy_from_slice(&round.result);
        Ok(())
    }
}

impl Drop for ThreadCollective {
    fn drop(&mut self) {
        let mut round = self.shared.round.lock();
        if thread::panicking() {
            warn!("worker {} panicked, aborting collective", self.rank);
            if round.aborted.is_none() {
                round.aborted = Some(self.rank);
            }
        } else {
            round.departed = true;
        }
        self.shared.cv.notify_all();
    }
}
