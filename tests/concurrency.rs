use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use parking_lot::Mutex;

use gravsim::simulation::states::{Body, BodySet, NVec3};
use gravsim::{
    bench_throughput, run_workers, spawn_consumer, spawn_render_consumer, BenchOptions, CollectiveError,
    Collective, ConfigError, Engine, MassControl, Parameters, Partition, RunOptions, Scenario, ScenarioConfig,
    SimError, Snapshot, StateChannel, StopSignal, ThreadCollective, ThroughputMeter, ThroughputSampler,
    ThroughputSummary,
};

const BENCH_YAML: &str = include_str!("../scenarios/benchmark.yaml");
const PROBE_YAML: &str = include_str!("../scenarios/probe.yaml");

fn scenario(yaml: &str, workers: usize) -> Scenario {
    let mut cfg = ScenarioConfig::from_yaml_str(yaml).unwrap();
    cfg.engine.workers = workers;
    Scenario::build_scenario(cfg).unwrap()
}

/// Sun and Earth on a circular-ish orbit, 2-hour steps
fn sun_earth(workers: usize) -> Scenario {
    let system = BodySet::new(vec![
        Body::new(0, "Sun", 1.989e30, NVec3::zeros(), NVec3::zeros()),
        Body::new(1, "Earth", 5.972e24, NVec3::new(1.5e11, 0.0, 0.0), NVec3::new(0.0, 29780.0, 0.0)),
    ]);
    let parameters = Parameters {
        h0: 7200.0,
        workers,
        ..Parameters::default()
    };
    Scenario::new(system, parameters)
}

fn initial_channel(scenario: &Scenario) -> StateChannel {
    StateChannel::with_initial(Snapshot::capture(&scenario.system, 0, 0.0))
}

// ==================================================================================
// Collective tests
// ==================================================================================

#[test]
fn thread_collective_sums_every_contribution() {
    let w = 4;
    let results: Vec<Vec<Vec<NVec3>>> = thread::scope(|s| {
        let handles: Vec<_> = ThreadCollective::group(w)
            .into_iter()
            .map(|mut c| {
                s.spawn(move || {
                    let mut seen = Vec::new();
                    for round in 0..50 {
                        let mut buf = vec![NVec3::zeros(); w];
                        buf[c.rank()] = NVec3::new((c.rank() + 1) as f64, round as f64, 0.0);
                        c.all_reduce_sum(&mut buf).unwrap();
                        seen.push(buf);
                    }
                    seen
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for per_worker in &results {
        for (round, buf) in per_worker.iter().enumerate() {
            for (k, v) in buf.iter().enumerate() {
                assert_eq!(*v, NVec3::new((k + 1) as f64, round as f64, 0.0));
            }
        }
    }
    // every worker saw the identical combined array
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn explicit_abort_fails_every_worker() {
    let mut group = ThreadCollective::group(2);
    let mut second = group.pop().unwrap();
    let first = group.pop().unwrap();

    let waiter = thread::spawn(move || {
        let mut buf = vec![NVec3::zeros(); 3];
        second.all_reduce_sum(&mut buf)
    });

    thread::sleep(Duration::from_millis(20));
    first.abort();

    assert_eq!(waiter.join().unwrap(), Err(CollectiveError::Aborted { rank: 0 }));
}

#[test]
fn panicking_worker_aborts_the_collective() {
    let mut group = ThreadCollective::group(2);
    let mut survivor = group.pop().unwrap();
    let doomed = group.pop().unwrap();

    let crashed = thread::spawn(move || {
        let _held = doomed;
        panic!("worker 0 lost its node");
    });
    assert!(crashed.join().is_err());

    let mut buf = vec![NVec3::zeros(); 3];
    assert_eq!(survivor.all_reduce_sum(&mut buf), Err(CollectiveError::Aborted { rank: 0 }));
}

#[test]
fn departed_worker_disbands_the_collective() {
    let mut group = ThreadCollective::group(2);
    let mut survivor = group.pop().unwrap();
    drop(group);

    let mut buf = vec![NVec3::zeros(); 3];
    assert_eq!(survivor.all_reduce_sum(&mut buf), Err(CollectiveError::Disbanded));
}

// ==================================================================================
// Worker set tests
// ==================================================================================

#[test]
fn worker_replicas_match_single_worker() {
    let steps = 200;
    let mut single = Engine::new(scenario(BENCH_YAML, 1));
    single.run_steps(steps).unwrap();

    for w in [2, 3, 4, 9] {
        let options = RunOptions {
            max_steps: Some(steps),
            ..RunOptions::default()
        };
        let reports = run_workers(&scenario(BENCH_YAML, w), &StopSignal::new(), options).unwrap();
        assert_eq!(reports.len(), w);

        for report in &reports {
            assert_eq!(report.steps, steps);
            for (a, b) in report.system.bodies.iter().zip(single.system.bodies.iter()) {
                let err = (a.x - b.x).norm();
                assert!(err <= 1e-9 * b.x.norm().max(1.0), "W = {w}: {} off by {err} m", a.name);
            }
        }

        // replicas never diverge from one another
        let first = reports[0].system.positions();
        for report in &reports[1..] {
            assert_eq!(report.system.positions(), first);
        }
    }
}

#[test]
fn workers_apply_thrust_identically() {
    let options = RunOptions {
        max_steps: Some(100),
        ..RunOptions::default()
    };
    let reports = run_workers(&scenario(PROBE_YAML, 2), &StopSignal::new(), options).unwrap();

    let probe: Vec<_> = reports.iter().map(|r| r.system.bodies[4].clone()).collect();
    assert_eq!(probe[0].x, probe[1].x);
    assert_eq!(probe[0].m, probe[1].m);
    assert!(probe[0].m < probe[0].m0, "the first burn should have used fuel");
}

#[test]
fn kepler_orbit_closes_with_two_workers() {
    let options = RunOptions {
        max_steps: Some(4380),
        ..RunOptions::default()
    };
    let reports = run_workers(&sun_earth(2), &StopSignal::new(), options).unwrap();
    assert_eq!(reports.len(), 2);

    for report in &reports {
        let r = report.system.bodies[1].x - report.system.bodies[0].x;
        assert_relative_eq!(r.norm(), 1.5e11, max_relative = 0.01);
        assert!(r.x / r.norm() > 0.99, "rank {}: Earth ended at {:?}", report.rank, r);
    }
    assert_eq!(reports[0].system.positions(), reports[1].system.positions());
}

#[test]
fn failed_reduction_during_mass_request_is_fatal() {
    let sc = sun_earth(2);
    let partition = Partition::new(2, 2).unwrap();
    let mut group = ThreadCollective::group(2);
    let mine = group.remove(0);
    drop(group);

    let controls = MassControl::default();
    let mut engine = Engine::for_worker(&sc, &partition, mine).with_mass_control(controls.clone());
    controls.set_mass_factor(1, 2.0);

    let result = engine.step();
    assert!(matches!(result, Err(SimError::Collective(CollectiveError::Disbanded))));
    assert_eq!(engine.steps(), 0);
}

#[test]
fn bad_mass_request_is_skipped() {
    let mut engine = Engine::new(sun_earth(1));
    let control = engine.mass_control();
    control.set_mass_factor(7, 2.0);
    control.set_mass_factor(1, -1.0);

    engine.step().unwrap();
    assert_eq!(engine.steps(), 1);
    assert_eq!(engine.system.bodies[1].m, engine.system.bodies[1].m0);
}

#[test]
fn workers_stop_cleanly_on_signal() {
    let stop = StopSignal::new();
    let timer = {
        let stop = stop.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stop.stop();
        })
    };

    let reports = run_workers(&scenario(BENCH_YAML, 3), &stop, RunOptions::default()).unwrap();
    timer.join().unwrap();

    assert_eq!(reports.len(), 3);
    let max = reports.iter().map(|r| r.steps).max().unwrap();
    for r in &reports {
        assert!(r.steps > 0);
        assert!(max - r.steps <= 1, "lock-step workers drifted apart");
    }
}

// ==================================================================================
// State channel tests
// ==================================================================================

#[test]
fn consumers_never_see_torn_snapshots() {
    let channel = StateChannel::new();
    let stop = StopSignal::new();

    let reader = {
        let channel = channel.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut last_t = f64::NEG_INFINITY;
            let mut reads = 0u64;
            while !stop.is_stopped() {
                let snap = channel.latest();
                assert_eq!(snap.positions.len(), snap.velocities.len());
                assert!(snap.t >= last_t, "simulated time went backwards");
                // positions and velocities were written at the same step
                for (x, v) in snap.positions.iter().zip(snap.velocities.iter()) {
                    assert_eq!(x.x, snap.t);
                    assert_eq!(v.x, snap.t);
                }
                last_t = snap.t;
                reads += 1;
            }
            reads
        })
    };

    for step in 1..=5000u64 {
        let t = step as f64;
        channel.publish(Snapshot {
            step,
            t,
            positions: vec![NVec3::new(t, 0.0, 0.0); 7],
            velocities: vec![NVec3::new(t, 0.0, 0.0); 7],
            steps_per_second: 0.0,
        });
    }
    stop.stop();

    assert!(reader.join().unwrap() > 0);
    assert_eq!(channel.latest().step, 5000);
}

#[test]
fn throttled_consumer_reads_engine_snapshots() {
    let sc = scenario(BENCH_YAML, 1);
    let channel = initial_channel(&sc);
    let stop = StopSignal::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let consumer = {
        let seen = Arc::clone(&seen);
        spawn_consumer(channel.clone(), 200.0, stop.clone(), move |snap| {
            seen.lock().push((snap.step, snap.t, snap.positions.len()));
        })
    };

    let mut engine = Engine::new(sc).with_channel(channel.clone());
    engine.run_steps(20_000).unwrap();
    stop.stop();
    consumer.join().unwrap();

    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|p| p[1].1 >= p[0].1 && p[1].0 >= p[0].0));
    assert!(seen.iter().all(|s| s.2 == 9));
    // the consumer ran at its own pace, far fewer reads than steps
    assert!((seen.len() as u64) < 20_000);
    assert_eq!(channel.latest().step, 20_000);
}

#[test]
fn publish_every_skips_intermediate_steps() {
    let mut sc = scenario(BENCH_YAML, 1);
    sc.parameters.publish_every = 10;
    let channel = StateChannel::new();

    let mut engine = Engine::new(sc).with_channel(channel.clone());
    assert_eq!(channel.latest().step, 0);

    for _ in 0..25 {
        engine.step().unwrap();
    }
    let snap = channel.latest();
    assert_eq!(snap.step, 20);
    assert_relative_eq!(snap.t, 20.0 * 120.0);
}

#[test]
fn bounded_run_publishes_its_last_step() {
    let mut sc = scenario(BENCH_YAML, 1);
    sc.parameters.publish_every = 10;
    let channel = StateChannel::new();

    let mut engine = Engine::new(sc).with_channel(channel.clone());
    engine.run_steps(25).unwrap();

    let snap = channel.latest();
    assert_eq!(snap.step, 25);
    assert_eq!(snap.positions, engine.system.positions());
}

#[test]
fn channel_seeded_with_initial_state_before_first_publish() {
    let sc = scenario(BENCH_YAML, 1);
    let channel = initial_channel(&sc);

    let snap = channel.latest();
    assert_eq!(snap.step, 0);
    assert_eq!(snap.positions, sc.system.positions());
    assert_eq!(snap.velocities.len(), 9);
}

#[test]
fn render_consumer_runs_at_configured_rate() {
    let mut cfg = ScenarioConfig::from_yaml_str(BENCH_YAML).unwrap();
    cfg.engine.render_hz = 20.0;
    let sc = Scenario::build_scenario(cfg).unwrap();
    assert_relative_eq!(sc.parameters.render_hz, 20.0);

    let channel = initial_channel(&sc);
    let stop = StopSignal::new();
    let reads = Arc::new(Mutex::new(0u32));

    let consumer = {
        let reads = Arc::clone(&reads);
        spawn_render_consumer(channel, &sc.parameters, stop.clone(), move |_| *reads.lock() += 1)
    };
    thread::sleep(Duration::from_millis(500));
    stop.stop();
    consumer.join().unwrap();

    // 20 Hz over half a second, plus the read that notices the stop
    let reads = *reads.lock();
    assert!((2..=14).contains(&reads), "{reads} reads at 20 Hz");
}

#[test]
fn engine_runs_until_stopped() {
    let stop = StopSignal::new();
    let channel = StateChannel::new();
    let engine = Engine::new(scenario(BENCH_YAML, 1)).with_channel(channel.clone());

    let producer = {
        let stop = stop.clone();
        thread::spawn(move || {
            let mut engine = engine;
            engine.run(&stop).map(|_| engine.steps())
        })
    };

    thread::sleep(Duration::from_millis(50));
    stop.stop();
    let steps = producer.join().unwrap().unwrap();

    assert!(steps > 0);
    assert_eq!(channel.latest().step, steps);
}

#[test]
fn bad_worker_count_is_rejected_before_spawning() {
    let mut sc = scenario(BENCH_YAML, 1);
    sc.parameters.workers = 10;
    let result = run_workers(&sc, &StopSignal::new(), RunOptions::default());
    assert!(matches!(result, Err(SimError::Config(_))));
}

// ==================================================================================
// Throughput tests
// ==================================================================================

#[test]
fn benchmark_returns_promptly_when_workers_fail() {
    let mut sc = scenario(BENCH_YAML, 1);
    sc.parameters.workers = 10;

    let started = Instant::now();
    let result = bench_throughput(&sc, &BenchOptions::default());

    assert!(matches!(result, Err(SimError::Config(ConfigError::InvalidWorkerCount { .. }))));
    assert!(started.elapsed() < Duration::from_secs(5), "waited out the benchmark timer");
}

#[test]
fn bench_options_reject_bad_durations() {
    let opts = BenchOptions::from_secs(2.0, 0.5).unwrap();
    assert_eq!(opts.warmup, Duration::from_secs(2));
    assert_eq!(opts.measure, Duration::from_millis(500));

    assert!(BenchOptions::from_secs(-1.0, 30.0).is_err());
    assert!(BenchOptions::from_secs(10.0, f64::NAN).is_err());
    assert!(BenchOptions::from_secs(f64::INFINITY, 30.0).is_err());
}

#[test]
fn meter_reports_steps_per_window() {
    let t0 = Instant::now();
    let mut meter = ThroughputMeter::new(Duration::from_secs(1), t0);

    assert_eq!(meter.tick(t0 + Duration::from_millis(500)), 0.0);
    assert_relative_eq!(meter.tick(t0 + Duration::from_secs(1)), 2.0);
    // holds the last value until the next window closes
    assert_relative_eq!(meter.tick(t0 + Duration::from_millis(1500)), 2.0);
}

#[test]
fn sampler_skips_warmup_and_samples_per_interval() {
    let t0 = Instant::now();
    let start = t0 + Duration::from_secs(1);
    let mut sampler = ThroughputSampler::new(Duration::from_millis(100), start);

    for ms in (0..1000).step_by(10) {
        assert_eq!(sampler.tick(t0 + Duration::from_millis(ms)), None);
    }
    assert!(sampler.samples().is_empty());

    assert_eq!(sampler.tick(start + Duration::from_millis(50)), None);
    let sample = sampler.tick(start + Duration::from_millis(100)).unwrap();
    assert_relative_eq!(sample, 20.0);
    assert_eq!(sampler.samples().len(), 1);
}

#[test]
fn summary_reports_mean_and_lows() {
    let samples: Vec<f64> = (1..=1000).rev().map(f64::from).collect();
    let s = ThroughputSummary::from_samples(&samples);

    assert_eq!(s.samples, 1000);
    assert_relative_eq!(s.mean, 500.5);
    assert_relative_eq!(s.low_1pct, 5.5); // mean of 1..=10
    assert_relative_eq!(s.low_01pct, 1.0);

    // fewer samples than the percentile still averages one
    let few = ThroughputSummary::from_samples(&[30.0, 10.0, 20.0]);
    assert_relative_eq!(few.low_1pct, 10.0);

    assert_eq!(ThroughputSummary::from_samples(&[]), ThroughputSummary::default());
}
