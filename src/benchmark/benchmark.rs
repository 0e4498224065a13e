use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::error::{ConfigError, Result};
use crate::simulation::engine::{run_workers, RunOptions, StopSignal};
use crate::simulation::scenario::Scenario;
use crate::simulation::throughput::ThroughputSampler;

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub warmup: Duration, // steps before this are not sampled
    pub measure: Duration, // sampling period after warm-up
    pub sample_interval: Duration, // one sample per interval
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(10),
            measure: Duration::from_secs(30),
            sample_interval: Duration::from_millis(100),
        }
    }
}

impl BenchOptions {
    /// Warm-up and measurement lengths in seconds, rejecting negative or
    /// non-finite values.
    pub fn from_secs(warmup: f64, measure: f64) -> std::result::Result<Self, ConfigError> {
        let secs = |name: &'static str, value: f64| {
            Duration::try_from_secs_f64(value).map_err(|e| ConfigError::InvalidParameter {
                name,
                reason: format!("{value}s: {e}"),
            })
        };
        Ok(Self {
            warmup: secs("bench.warmup", warmup)?,
            measure: secs("bench.measure", measure)?,
            ..Self::default()
        })
    }
}

/// Mean and low-percentile steps/s over a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThroughputSummary {
    pub samples: usize,
    pub mean: f64,
    pub low_1pct: f64, // mean of the slowest 1 % (at least one sample)
    pub low_01pct: f64, // mean of the slowest 0.1 % (at least one sample)
}

impl ThroughputSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mean_of_lowest = |frac: f64| {
            let k = ((n as f64 * frac) as usize).max(1);
            sorted[..k].iter().sum::<f64>() / k as f64
        };

        Self {
            samples: n,
            mean: sorted.iter().sum::<f64>() / n as f64,
            low_1pct: mean_of_lowest(0.01),
            low_01pct: mean_of_lowest(0.001),
        }
    }
}

impl fmt::Display for ThroughputSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples       : {}", self.samples)?;
        writeln!(f, "Average SPS   : {:10.1}", self.mean)?;
        writeln!(f, "1 % Low SPS   : {:10.1}", self.low_1pct)?;
        write!(f, "0.1 % Low SPS : {:10.1}", self.low_01pct)
    }
}

/// Run the scenario's worker set for warm-up plus measurement time and
/// gather the throughput samples of every rank.
pub fn bench_throughput(scenario: &Scenario, opts: &BenchOptions) -> Result<Vec<f64>> {
    let stop = StopSignal::new();
    let start = Instant::now();
    let sampler = ThroughputSampler::new(opts.sample_interval, start + opts.warmup);

    info!(
        "benchmark: {} worker(s), {:?} warm-up, {:?} measured",
        scenario.parameters.workers, opts.warmup, opts.measure
    );

    let reports = thread::scope(|s| {
        let timer_stop = stop.clone();
        let deadline = start + opts.warmup + opts.measure;
        s.spawn(move || {
            // wake early if the workers are already gone
            while !timer_stop.is_stopped() {
                let now = Instant::now();
                if now >= deadline {
                    timer_stop.stop();
                    break;
                }
                thread::sleep((deadline - now).min(Duration::from_millis(50)));
            }
        });

        let options = RunOptions {
            sampler: Some(sampler),
            ..RunOptions::default()
        };
        let result = run_workers(scenario, &stop, options);
        stop.stop();
        result
    })?;

    Ok(reports.into_iter().flat_map(|r| r.samples).collect())
}

/// Benchmark every worker count from 1 to N
/// Paste output directly into a spreadsheet to graph
pub fn bench_worker_curve(scenario: &Scenario, opts: &BenchOptions) -> Result<()> {
    println!("workers,mean_sps,low_1pct_sps");

    for workers in 1..=scenario.system.len() {
        let mut run = scenario.clone();
        run.parameters.workers = workers;

        let summary = ThroughputSummary::from_samples(&bench_throughput(&run, opts)?);
        println!("{},{:.1},{:.1}", workers, summary.mean, summary.low_1pct);
    }
    Ok(())
}
