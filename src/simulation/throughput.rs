//! Wall-clock throughput of the integration loop
//!
//! - [`ThroughputMeter`]: steps per second over a fixed refresh window,
//!   the figure carried in every published snapshot.
//! - [`ThroughputSampler`]: one steps-per-second sample per fixed sampling
//!   interval, collected for a benchmark after a warm-up period.
//!
//! Both take the current `Instant` from the caller so tests can drive them
//! with synthetic clocks.

use std::time::{Duration, Instant};

use log::debug;

#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    steps: u64,
    mark: Instant,
    current: f64,
}

impl ThroughputMeter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            steps: 0,
            mark: now,
            current: 0.0,
        }
    }

    /// Count one completed step; refreshes the rate when the window closes.
    pub fn tick(&mut self, now: Instant) -> f64 {
        self.steps += 1;
        let elapsed = now.saturating_duration_since(self.mark);
        if elapsed >= self.window {
            self.current = self.steps as f64 / elapsed.as_secs_f64();
            debug!("throughput {:.1} steps/s", self.current);
            self.steps = 0;
            self.mark = now;
        }
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    interval: Duration,
    measure_from: Instant,
    steps: u64,
    mark: Instant,
    samples: Vec<f64>,
}

impl ThroughputSampler {
    /// Sample every `interval`, ignoring steps before `measure_from`.
    pub fn new(interval: Duration, measure_from: Instant) -> Self {
        Self {
            interval,
            measure_from,
            steps: 0,
            mark: measure_from,
            samples: Vec::new(),
        }
    }

    /// Count one completed step; returns the new sample when one is taken.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        if now < self.measure_from {
            return None;
        }
        self.steps += 1;
        let elapsed = now.saturating_duration_since(self.mark);
        if elapsed >= self.interval {
            let sample = self.steps as f64 / elapsed.as_secs_f64();
            self.samples.push(sample);
            self.steps = 0;
            self.mark = now;
            return Some(sample);
        }
        None
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}
