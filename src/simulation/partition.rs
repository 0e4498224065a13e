//! Static block partition of body indices over workers
//!
//! N bodies are split into W contiguous half-open ranges: every block gets
//! `N / W` bodies and the first `N % W` blocks get one extra. The partition
//! is computed once at startup and never changes during a run.

use std::ops::Range;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    n: usize,
    ranges: Vec<Range<usize>>,
}

impl Partition {
    /// Split `n` bodies over `workers` workers.
    ///
    /// Fails when there are no bodies, no workers, or more workers than
    /// bodies (a worker would own an empty range).
    pub fn new(n: usize, workers: usize) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::NoBodies);
        }
        if workers == 0 || workers > n {
            return Err(ConfigError::InvalidWorkerCount { workers, bodies: n });
        }

        let base = n / workers;
        let extra = n % workers;

        let mut ranges = Vec::with_capacity(workers);
        let mut start = 0;
        for w in 0..workers {
            let len = base + usize::from(w < extra);
            ranges.push(start..start + len);
            start += len;
        }
        debug_assert_eq!(start, n);

        Ok(Self { n, ranges })
    }

    /// Range owned by worker `rank`.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.ranges[rank].clone()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn workers(&self) -> usize {
        self.ranges.len()
    }

    pub fn bodies(&self) -> usize {
        self.n
    }
}
