//! Host-side helpers for the `ringkey` binary.
//!
//! This crate provides:
//! - Loading and merging simulation settings from a JSON file and flags
//! - Running a complete multi-participant session in-process

pub mod config;
pub mod simulate;

pub use config::SimulationConfig;
pub use simulate::{run_simulation, SimulationOptions, SimulationReport};
