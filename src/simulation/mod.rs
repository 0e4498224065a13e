pub mod states;
pub mod params;
pub mod partition;
pub mod collective;
pub mod forces;
pub mod integrator;
pub mod thrust;
pub mod channel;
pub mod throughput;
pub mod engine;
pub mod scenario;
