//! Simulation driver: configuration, random stock events and the wiring that
//! runs them through the dispatcher.

pub mod config;
pub mod generator;
pub mod simulation;


pub use config::{ConfigError, SimulationConfig};
pub use generator::EventGenerator;
pub use simulation::{DeliveryCounts, MachineReport, ThresholdCheck, Simulation, SimulationError, SimulationReport};
