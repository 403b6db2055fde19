//! Signal-to-order execution.

pub mod engine;

pub use engine::{EngineSettings, ExecutionEngine};
