//! Reverse-mode autodiff over scalar values, and a small MLP built on it.

pub mod config;
pub mod engine;
pub mod error;
pub mod nn;
pub mod train;

pub use daggy::NodeIndex;
pub use engine::{ComputationGraph, Op, Operand, Value};
pub use error::{GraphError, TrainError};
pub use nn::{Layer, Network, Neuron, Output};
