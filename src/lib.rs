pub mod simulation;
pub mod configuration;
pub mod benchmark;
pub mod error;

pub use simulation::states::{Body, BodySet, NVec3};
pub use simulation::params::{Parameters, G_SI};
pub use simulation::partition::Partition;
pub use simulation::collective::{Collective, Solo, ThreadCollective};
pub use simulation::forces::{partial_forces, ForceEvaluator};
pub use simulation::integrator::Integrator;
pub use simulation::thrust::{ThrustController, ThrustPhase, ThrustState};
pub use simulation::channel::{spawn_consumer, spawn_render_consumer, Snapshot, StateChannel};
pub use simulation::throughput::{ThroughputMeter, ThroughputSampler};
pub use simulation::engine::{run_workers, Engine, MassControl, RunOptions, StopSignal, WorkerReport};
pub use simulation::scenario::Scenario;

pub use configuration::config::{BodyConfig, EngineConfig, ParametersConfig, PhaseConfig, ScenarioConfig, ThrustConfig};

pub use error::{CollectiveError, ConfigError, Result, SimError};

pub use benchmark::benchmark::{bench_throughput, bench_worker_curve, BenchOptions, ThroughputSummary};
