//! Vehicle simulation.

pub mod paths;
pub mod vehicle;

pub use paths::{CircularPath, TrackPath};
pub use vehicle::{CircularFence, SimStep, SimulatedVehicle};
