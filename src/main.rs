use gravsim::{ScenarioConfig, Scenario, Engine, Snapshot, StateChannel, StopSignal, RunOptions};
use gravsim::{run_workers, spawn_render_consumer};
use gravsim::{bench_throughput, bench_worker_curve, BenchOptions, ThroughputSummary};

use clap::Parser;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};

use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, default_value = "solar_system.yaml")]
    file_name: String,

    /// Override the scenario's worker count
    #[arg(long)]
    workers: Option<usize>,

    /// Stop after this many steps instead of running until killed
    #[arg(long)]
    steps: Option<u64>,

    /// Measure throughput instead of running the logging consumer
    #[arg(long)]
    bench: bool,

    /// Benchmark every worker count from 1 to N and print CSV
    #[arg(long)]
    curve: bool,

    #[arg(long, default_value_t = 10.0)]
    warmup: f64,

    #[arg(long, default_value_t = 30.0)]
    secs: f64,

    /// Rate of the logging consumer, defaults to the scenario's render_hz
    #[arg(long)]
    print_hz: Option<f64>,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let given = PathBuf::from(file_name);
    let config_path = if given.exists() {
        given
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name)
    };

    let cfg = ScenarioConfig::from_yaml_file(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    Ok(cfg)
}

fn run_headless(scenario: Scenario, args: &Args) -> Result<()> {
    let names: Vec<String> = scenario.system.bodies.iter().map(|b| b.name.clone()).collect();
    let channel = StateChannel::with_initial(Snapshot::capture(&scenario.system, 0, 0.0));
    let stop = StopSignal::new();

    let mut parameters = scenario.parameters.clone();
    if let Some(hz) = args.print_hz {
        if !(hz.is_finite() && hz > 0.0) {
            bail!("--print-hz must be positive, got {hz}");
        }
        parameters.render_hz = hz;
    }

    // Stand-in for a renderer: read the latest state at its own pace
    let consumer = spawn_render_consumer(channel.clone(), &parameters, stop.clone(), move |snap| {
        info!(
            "step {:>9}  t = {:>10.2} days  {:>10.1} steps/s",
            snap.step,
            snap.t / 86_400.0,
            snap.steps_per_second
        );
        for (name, x) in names.iter().zip(snap.positions.iter()) {
            debug!("  {name:<10} |x| = {:.4e} m", x.norm());
        }
    });

    let result = if scenario.parameters.workers == 1 {
        let mut engine = Engine::new(scenario).with_channel(channel);
        match args.steps {
            Some(n) => engine.run_steps(n),
            None => engine.run(&stop),
        }
    } else {
        let options = RunOptions {
            channel: Some(channel),
            max_steps: args.steps,
            ..RunOptions::default()
        };
        run_workers(&scenario, &stop, options).map(|_| ())
    };

    stop.stop();
    consumer.join().map_err(|_| anyhow!("consumer thread panicked"))?;
    result?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    if let Some(workers) = args.workers {
        scenario_cfg.engine.workers = workers;
    }
    let scenario = Scenario::build_scenario(scenario_cfg).context("invalid scenario")?;

    let bench = BenchOptions::from_secs(args.warmup, args.secs).context("invalid benchmark timing")?;

    if args.curve {
        bench_worker_curve(&scenario, &bench)?;
    } else if args.bench {
        let samples = bench_throughput(&scenario, &bench)?;
        let summary = ThroughputSummary::from_samples(&samples);
        println!("\n=== N-body benchmark ({} workers) ===\n{summary}\n", scenario.parameters.workers);
    } else {
        run_headless(scenario, &args)?;
    }

    Ok(())
}
